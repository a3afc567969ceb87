//! Shared fixtures for the rotation integration tests: a mocked Vault token
//! backend and helpers to assemble the engine against mock destinations.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use vaultflow::config::AppConfig;
use vaultflow::observability::Metrics;
use vaultflow::rotation::{BindingRoute, Dispatcher, Scheduler};
use vaultflow::vault::SessionConfig;

/// Body of a successful `auth/token/lookup-self` call.
pub fn lookup_self_body() -> serde_json::Value {
    serde_json::json!({
        "request_id": "3ed1b3cd-9f3e-4ec1-8b23-ab1b35e9b1e8",
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": {
            "accessor": "8609694a-cdbc-db9b-d345-e782dbb562ed",
            "creation_time": 1700000000u64,
            "creation_ttl": 2764800u64,
            "display_name": "token-rotator",
            "entity_id": "7d2e3179-f69b-450c-7179-ac8ee8bd8ca9",
            "expire_time": "2026-09-07T00:00:00.000000Z",
            "explicit_max_ttl": 0,
            "id": "test-session-token",
            "issue_time": "2026-08-07T00:00:00.000000Z",
            "meta": { "username": "rotator" },
            "num_uses": 0,
            "orphan": true,
            "path": "auth/token/create",
            "policies": ["default", "token-minter"],
            "renewable": true,
            "ttl": 2764800u64,
            "type": "service"
        },
        "wrap_info": null,
        "warnings": null,
        "auth": null
    })
}

/// Body of a successful `auth/token/create` call minting `token`.
pub fn token_create_body(token: &str) -> serde_json::Value {
    serde_json::json!({
        "request_id": "f00341c1-fad5-f6e6-13fd-235617f858a1",
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": null,
        "wrap_info": null,
        "warnings": null,
        "auth": {
            "client_token": token,
            "accessor": "0e9e354a-520f-df04-6867-ee81cae9cf84",
            "policies": ["default"],
            "token_policies": ["default"],
            "metadata": null,
            "lease_duration": 3600,
            "renewable": true,
            "entity_id": "",
            "token_type": "service",
            "orphan": false,
            "num_uses": 0
        }
    })
}

/// Responds to token-create calls with a distinct token per request, so
/// tests can prove no credential is shared across bindings.
pub struct SequentialTokens {
    counter: AtomicU64,
}

impl SequentialTokens {
    pub fn new() -> Self {
        Self { counter: AtomicU64::new(0) }
    }
}

impl Respond for SequentialTokens {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(200).set_body_json(token_create_body(&format!("hvs.minted-{}", n)))
    }
}

/// Start a mock Vault that validates any session token and mints
/// sequentially numbered credentials.
pub async fn mock_vault() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(ResponseTemplate::new(200).set_body_json(lookup_self_body()))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/token/create"))
        .respond_with(SequentialTokens::new())
        .mount(&server)
        .await;

    server
}

/// Start a mock Vault whose session validation always fails.
pub async fn mock_vault_rejecting_sessions() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "errors": ["permission denied"]
            })),
        )
        .mount(&server)
        .await;

    server
}

/// A token file whose lifetime keeps the session material readable.
pub fn session_token_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create token file");
    writeln!(file, "test-session-token").expect("write token file");
    file
}

/// Parse an `AppConfig` from YAML with the mock Vault's address filled in.
pub fn config_from_yaml(vault_address: &str, bindings_yaml: &str) -> AppConfig {
    let yaml = format!("vault_address: {}\n{}", vault_address, bindings_yaml);
    let config: AppConfig = serde_yaml::from_str(&yaml).expect("parse test config");
    config.validate().expect("valid test config");
    config
}

/// Assemble a scheduler over explicit routes, returning its metrics handle.
pub fn build_engine(
    config: &AppConfig,
    routes: Vec<BindingRoute>,
    token_file: &NamedTempFile,
) -> (Scheduler, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new());
    let dispatcher = Dispatcher::new(routes, Arc::clone(&metrics), config);
    let session = SessionConfig {
        address: config.vault_address.clone(),
        token_file: Some(token_file.path().to_path_buf()),
        request_timeout: config.request_timeout(),
    };
    let scheduler = Scheduler::new(dispatcher, session, Arc::clone(&metrics), config);
    (scheduler, metrics)
}
