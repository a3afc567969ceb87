//! End-to-end rotation cycles against a mocked Vault and mocked destination
//! APIs: fan-out isolation, credential uniqueness, upsert semantics, and the
//! one-shot exit contract.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use wiremock::matchers::{body_string_contains, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vaultflow::destinations::{
    CircleCiDestination, Destination, SpaceliftDestination, TfCloudDestination,
};
use vaultflow::errors::Error;
use vaultflow::rotation::{BindingRoute, Platform};

use common::{
    build_engine, config_from_yaml, mock_vault, mock_vault_rejecting_sessions, session_token_file,
};

fn circleci_routes(config: &vaultflow::AppConfig, api_url: &str) -> Vec<BindingRoute> {
    let destination: Arc<dyn Destination> = Arc::new(
        CircleCiDestination::new("circle-secret", config.request_timeout())
            .unwrap()
            .with_api_url(api_url),
    );
    config
        .circleci
        .iter()
        .map(|b| BindingRoute { binding: b.into(), destination: Arc::clone(&destination) })
        .collect()
}

fn tfcloud_routes(config: &vaultflow::AppConfig, api_url: &str) -> Vec<BindingRoute> {
    let destination: Arc<dyn Destination> = Arc::new(
        TfCloudDestination::new("tfc-secret", config.request_timeout())
            .unwrap()
            .with_api_url(api_url),
    );
    config
        .tfcloud
        .iter()
        .map(|b| BindingRoute { binding: b.into(), destination: Arc::clone(&destination) })
        .collect()
}

fn spacelift_routes(config: &vaultflow::AppConfig, endpoint: &str) -> Vec<BindingRoute> {
    let destination: Arc<dyn Destination> = Arc::new(
        SpaceliftDestination::new(endpoint, "key-id", "key-secret", config.request_timeout())
            .unwrap(),
    );
    config
        .spacelift
        .iter()
        .map(|b| BindingRoute { binding: b.into(), destination: Arc::clone(&destination) })
        .collect()
}

#[tokio::test]
async fn one_shot_succeeds_and_counts_every_binding() {
    let vault = mock_vault().await;

    let circleci = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/project/gh/.+/envvar$"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&circleci)
        .await;

    let tfcloud = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/workspaces/ws-abc123/vars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })))
        .mount(&tfcloud)
        .await;
    Mock::given(method("POST"))
        .and(path("/workspaces/ws-abc123/vars"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&tfcloud)
        .await;

    let config = config_from_yaml(
        &vault.uri(),
        r#"
circleci:
  - name: acme/deploy
  - name: acme/release
tfcloud:
  - workspace: ws-abc123
"#,
    );

    let mut routes = circleci_routes(&config, &circleci.uri());
    routes.extend(tfcloud_routes(&config, &tfcloud.uri()));

    let token_file = session_token_file();
    let (scheduler, metrics) = build_engine(&config, routes, &token_file);

    scheduler.run_once().await.expect("clean cycle returns no error");

    assert_eq!(metrics.updates(Platform::CircleCi), 2);
    assert_eq!(metrics.updates(Platform::TfCloud), 1);
    assert_eq!(metrics.errors_total(), 0);
    assert_eq!(metrics.session_errors(), 0);
}

#[tokio::test]
async fn credentials_are_never_shared_across_bindings() {
    let vault = mock_vault().await;

    let circleci = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/project/gh/.+/envvar$"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&circleci)
        .await;

    let config = config_from_yaml(
        &vault.uri(),
        r#"
circleci:
  - name: acme/deploy
  - name: acme/release
  - name: acme/docs
"#,
    );

    let token_file = session_token_file();
    let (scheduler, metrics) =
        build_engine(&config, circleci_routes(&config, &circleci.uri()), &token_file);

    scheduler.run_once().await.expect("clean cycle");
    assert_eq!(metrics.updates(Platform::CircleCi), 3);

    let minted: HashSet<String> = circleci
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter_map(|request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).ok()?;
            (body["name"] == "VAULT_TOKEN").then(|| body["value"].as_str().unwrap().to_string())
        })
        .collect();

    // One distinct credential per binding, none of them the session token.
    assert_eq!(minted.len(), 3);
    assert!(!minted.contains("test-session-token"));
}

#[tokio::test]
async fn issuance_failure_is_isolated_to_its_binding() {
    let vault = mock_vault().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/token/create/broken-role"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(serde_json::json!({ "errors": ["permission denied"] })),
        )
        .mount(&vault)
        .await;

    let circleci = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/project/gh/.+/envvar$"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&circleci)
        .await;

    let config = config_from_yaml(
        &vault.uri(),
        r#"
circleci:
  - name: acme/deploy
  - name: acme/release
    vault_role: broken-role
  - name: acme/docs
"#,
    );

    let token_file = session_token_file();
    let (scheduler, metrics) =
        build_engine(&config, circleci_routes(&config, &circleci.uri()), &token_file);

    let err = scheduler.run_once().await.expect_err("aggregate failure");
    assert!(matches!(err, Error::CycleFailed { errors: 1 }));

    assert_eq!(metrics.issuance_errors(), 1);
    assert_eq!(metrics.errors_total(), 1);
    assert_eq!(metrics.updates(Platform::CircleCi), 2);
    assert_eq!(metrics.write_errors(Platform::CircleCi), 0);
}

#[tokio::test]
async fn session_failure_means_zero_dispatch_attempts() {
    let vault = mock_vault_rejecting_sessions().await;

    let circleci = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/project/gh/.+/envvar$"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&circleci)
        .await;

    let config = config_from_yaml(
        &vault.uri(),
        r#"
circleci:
  - name: acme/deploy
  - name: acme/release
"#,
    );

    let token_file = session_token_file();
    let (scheduler, metrics) =
        build_engine(&config, circleci_routes(&config, &circleci.uri()), &token_file);

    let err = scheduler.run_once().await.expect_err("session failure aborts the cycle");
    assert!(matches!(err, Error::CycleFailed { errors: 1 }));

    assert_eq!(metrics.session_errors(), 1);
    assert_eq!(metrics.errors_total(), 1);
    assert_eq!(metrics.updates(Platform::CircleCi), 0);

    // No credential was minted and no destination was touched.
    let create_calls = vault
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().contains("/token/create"))
        .count();
    assert_eq!(create_calls, 0);
    assert!(circleci.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn write_failure_is_isolated_and_short_circuits_the_binding() {
    let vault = mock_vault().await;

    let circleci = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/project/gh/acme/flaky/envvar"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&circleci)
        .await;
    Mock::given(method("POST"))
        .and(path("/project/gh/acme/stable/envvar"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&circleci)
        .await;

    let config = config_from_yaml(
        &vault.uri(),
        r#"
circleci:
  - name: acme/flaky
  - name: acme/stable
"#,
    );

    let token_file = session_token_file();
    let (scheduler, metrics) =
        build_engine(&config, circleci_routes(&config, &circleci.uri()), &token_file);

    scheduler.run_once().await.expect_err("one failed binding fails the one-shot run");

    assert_eq!(metrics.write_errors(Platform::CircleCi), 1);
    assert_eq!(metrics.updates(Platform::CircleCi), 1);
    assert_eq!(metrics.errors_total(), 1);

    let requests = circleci.received_requests().await.unwrap();
    let flaky_calls =
        requests.iter().filter(|r| r.url.path().contains("acme/flaky")).count();
    let stable_calls =
        requests.iter().filter(|r| r.url.path().contains("acme/stable")).count();

    // The failed binding stops after its first write; the healthy sibling
    // delivers both the token and the broker address.
    assert_eq!(flaky_calls, 1);
    assert_eq!(stable_calls, 2);
}

#[tokio::test]
async fn tfcloud_upsert_updates_existing_variable_in_place() {
    let vault = mock_vault().await;

    let tfcloud = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/workspaces/ws-abc123/vars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {
                    "id": "var-existing1",
                    "type": "vars",
                    "attributes": { "key": "VAULT_TOKEN", "category": "env" }
                }
            ]
        })))
        .mount(&tfcloud)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/workspaces/ws-abc123/vars/var-existing1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&tfcloud)
        .await;
    // Only the broker-address variable is new; the token updates in place.
    Mock::given(method("POST"))
        .and(path("/workspaces/ws-abc123/vars"))
        .and(body_string_contains("VAULT_ADDR"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&tfcloud)
        .await;

    let config = config_from_yaml(
        &vault.uri(),
        r#"
tfcloud:
  - workspace: ws-abc123
    name: prod-network
"#,
    );

    let token_file = session_token_file();
    let (scheduler, metrics) =
        build_engine(&config, tfcloud_routes(&config, &tfcloud.uri()), &token_file);

    scheduler.run_once().await.expect("upsert cycle succeeds");
    assert_eq!(metrics.updates(Platform::TfCloud), 1);
    assert_eq!(metrics.errors_total(), 0);
}

#[tokio::test]
async fn circleci_rate_limit_fails_without_retry() {
    let vault = mock_vault().await;

    let circleci = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/project/gh/acme/deploy/envvar"))
        .respond_with(
            ResponseTemplate::new(429).insert_header("retry-after", "42"),
        )
        .mount(&circleci)
        .await;

    let config = config_from_yaml(
        &vault.uri(),
        r#"
circleci:
  - name: acme/deploy
"#,
    );

    let token_file = session_token_file();
    let (scheduler, metrics) =
        build_engine(&config, circleci_routes(&config, &circleci.uri()), &token_file);

    scheduler.run_once().await.expect_err("rate-limited binding fails the run");

    assert_eq!(metrics.write_errors(Platform::CircleCi), 1);
    assert_eq!(metrics.updates(Platform::CircleCi), 0);

    // Recognized, logged, but never retried.
    assert_eq!(circleci.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn spacelift_empty_exchange_token_is_a_hard_failure() {
    let vault = mock_vault().await;

    let spacelift = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("apiKeyUser"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "apiKeyUser": { "id": "key-id", "jwt": "" } }
        })))
        .mount(&spacelift)
        .await;

    let config = config_from_yaml(
        &vault.uri(),
        r#"
spacelift:
  - stack: core-infra
"#,
    );

    let token_file = session_token_file();
    let (scheduler, metrics) =
        build_engine(&config, spacelift_routes(&config, &spacelift.uri()), &token_file);

    scheduler.run_once().await.expect_err("empty bearer token fails the binding");

    assert_eq!(metrics.write_errors(Platform::Spacelift), 1);
    assert_eq!(metrics.updates(Platform::Spacelift), 0);

    // No mutation was attempted with the unusable token.
    let mutations = spacelift
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| String::from_utf8_lossy(&r.body).contains("stackConfigAdd"))
        .count();
    assert_eq!(mutations, 0);
}

#[tokio::test]
async fn spacelift_batches_all_variables_into_one_mutation() {
    let vault = mock_vault().await;

    let spacelift = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("apiKeyUser"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "apiKeyUser": { "id": "key-id", "jwt": "exchange-jwt" } }
        })))
        .mount(&spacelift)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("stackConfigAdd"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": {} })),
        )
        .expect(1)
        .mount(&spacelift)
        .await;

    let config = config_from_yaml(
        &vault.uri(),
        r#"
spacelift:
  - stack: core-infra
"#,
    );

    let token_file = session_token_file();
    let (scheduler, metrics) =
        build_engine(&config, spacelift_routes(&config, &spacelift.uri()), &token_file);

    scheduler.run_once().await.expect("batched mutation succeeds");
    assert_eq!(metrics.updates(Platform::Spacelift), 1);

    let requests = spacelift.received_requests().await.unwrap();
    let mutation = requests
        .iter()
        .find(|r| String::from_utf8_lossy(&r.body).contains("stackConfigAdd"))
        .expect("one batched mutation");

    let body = String::from_utf8_lossy(&mutation.body).to_string();
    assert!(body.contains("VAULT_TOKEN"));
    assert!(body.contains("VAULT_ADDR"));

    let bearer = mutation.headers.get("authorization").expect("bearer header");
    assert_eq!(bearer.to_str().unwrap(), "Bearer exchange-jwt");
}

#[tokio::test]
async fn continuous_mode_runs_a_cycle_immediately_and_stops_on_cancel() {
    let vault = mock_vault_rejecting_sessions().await;

    let config = config_from_yaml(&vault.uri(), "");
    let token_file = session_token_file();
    let (scheduler, metrics) = build_engine(&config, Vec::new(), &token_file);

    let shutdown = tokio_util::sync::CancellationToken::new();
    let stopper = shutdown.clone();

    let runner = tokio::spawn(async move {
        scheduler.run(shutdown).await;
    });

    // The first cycle fires immediately; wait for its outcome to land.
    for _ in 0..100 {
        if metrics.session_errors() >= 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(metrics.session_errors(), 1);

    stopper.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(5), runner)
        .await
        .expect("loop stops promptly after cancellation")
        .expect("loop task does not panic");
}
