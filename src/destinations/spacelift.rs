//! Spacelift destination: batched stack-configuration mutations.
//!
//! The Spacelift GraphQL API requires a bearer token obtained by exchanging
//! the tenant API key. The exchange happens once per binding per cycle and
//! the resulting token stays local to that dispatch task; it is never cached
//! on the adapter, which is shared across concurrent tasks. All variables
//! for one stack go out in a single mutation.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::error::WriteError;
use super::{build_http_client, Destination, Variable};
use crate::errors::Error;
use crate::rotation::{Binding, Platform};
use crate::vault::SecretString;

const PLATFORM: &str = "spacelift";
const VARIABLE_DESCRIPTION: &str = "Managed by vaultflow";

/// Writes stack environment variables through the Spacelift GraphQL API.
pub struct SpaceliftDestination {
    client: reqwest::Client,
    /// Tenant GraphQL endpoint, usually `https://<tenant>.app.spacelift.io/graphql`.
    endpoint: String,
    api_key_id: String,
    api_key_secret: SecretString,
}

impl SpaceliftDestination {
    /// Create an adapter for one Spacelift tenant.
    pub fn new(
        endpoint: impl Into<String>,
        api_key_id: impl Into<String>,
        api_key_secret: impl Into<SecretString>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        Ok(Self {
            client: build_http_client(timeout)?,
            endpoint: endpoint.into(),
            api_key_id: api_key_id.into(),
            api_key_secret: api_key_secret.into(),
        })
    }

    /// Exchange the tenant API key for a short-lived bearer token.
    ///
    /// An empty token in an otherwise successful response is a hard failure
    /// for the binding; no mutation is attempted with it.
    pub async fn exchange_token(&self) -> Result<SecretString, WriteError> {
        let query = format!(
            r#"mutation GetSpaceliftToken {{ apiKeyUser(id: "{}", secret: "{}") {{ id jwt }} }}"#,
            escape(&self.api_key_id),
            escape(self.api_key_secret.expose_secret()),
        );

        let body = self.post(None, &query).await?;
        let jwt = body
            .pointer("/data/apiKeyUser/jwt")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if jwt.is_empty() {
            return Err(WriteError::EmptyExchangeToken { platform: PLATFORM });
        }
        Ok(SecretString::new(jwt))
    }

    /// Add or overwrite the given variables on one stack in a single
    /// batched mutation.
    pub async fn set_stack_variables(
        &self,
        bearer: &SecretString,
        stack: &str,
        vars: &[Variable],
    ) -> Result<(), WriteError> {
        let query = build_config_mutation(stack, vars);
        let body = self.post(Some(bearer), &query).await?;

        if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
            return Err(WriteError::Remote { platform: PLATFORM, message: errors.to_string() });
        }
        Ok(())
    }

    async fn post(&self, bearer: Option<&SecretString>, query: &str) -> Result<Value, WriteError> {
        let mut request =
            self.client.post(&self.endpoint).json(&serde_json::json!({ "query": query }));
        if let Some(token) = bearer {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|source| WriteError::Transport { platform: PLATFORM, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WriteError::UnexpectedStatus { platform: PLATFORM, status: status.as_u16() });
        }

        response
            .json::<Value>()
            .await
            .map_err(|source| WriteError::Decode { platform: PLATFORM, source })
    }
}

/// Build one mutation adding every variable to the stack's configuration.
///
/// Each entry gets a lowercased alias so the aliases stay valid GraphQL
/// names while the variable IDs keep their configured casing.
fn build_config_mutation(stack: &str, vars: &[Variable]) -> String {
    let mut query = String::from("mutation {");
    for var in vars {
        query.push_str(&format!(
            r#"
{alias}: stackConfigAdd(
    stack: "{stack}"
    config: {{
        id: "{key}"
        value: "{value}"
        type: ENVIRONMENT_VARIABLE
        writeOnly: {write_only}
        description: "{description}"
    }}
) {{
    id
}}
"#,
            alias = var.key.to_lowercase(),
            stack = escape(stack),
            key = escape(&var.key),
            value = escape(var.value.expose_secret()),
            write_only = var.sensitive,
            description = VARIABLE_DESCRIPTION,
        ));
    }
    query.push('}');
    query
}

/// Escape a value for inclusion in a GraphQL string literal.
fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl Destination for SpaceliftDestination {
    fn platform(&self) -> Platform {
        Platform::Spacelift
    }

    async fn apply(&self, binding: &Binding, vars: &[Variable]) -> Result<(), WriteError> {
        let bearer = self.exchange_token().await?;
        self.set_stack_variables(&bearer, &binding.remote_id, vars).await
    }
}
