//! Terraform Cloud destination: workspace-variable upsert.
//!
//! The workspace-variables API has no overwrite-on-create, so this adapter
//! lists the target workspace's variables first and updates a matching key
//! in place by its remote ID; only a missing key results in a create. This
//! is the only family with true idempotent-upsert semantics.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::error::WriteError;
use super::{build_http_client, Destination, Variable};
use crate::errors::Error;
use crate::rotation::{Binding, Platform};
use crate::vault::SecretString;

/// Production Terraform Cloud API endpoint.
pub const DEFAULT_API_URL: &str = "https://app.terraform.io/api/v2";

const PLATFORM: &str = "tfcloud";
const CONTENT_TYPE: &str = "application/vnd.api+json";
const VARIABLE_DESCRIPTION: &str = "Managed by vaultflow";

#[derive(Debug, Deserialize)]
struct WorkspaceVariables {
    data: Vec<WorkspaceVariable>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceVariable {
    id: String,
    attributes: WorkspaceVariableAttributes,
}

#[derive(Debug, Deserialize)]
struct WorkspaceVariableAttributes {
    key: String,
}

/// Writes workspace environment variables through the Terraform Cloud API.
pub struct TfCloudDestination {
    client: reqwest::Client,
    api_url: String,
    token: SecretString,
}

impl TfCloudDestination {
    /// Create an adapter authenticating with the given team/user API token.
    pub fn new(token: impl Into<SecretString>, timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            client: build_http_client(timeout)?,
            api_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
        })
    }

    /// Override the API endpoint (used by tests against a mock server).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Upsert one environment variable in a workspace.
    ///
    /// `workspace` is the opaque workspace ID (`ws-...`), not its name.
    pub async fn set_variable(&self, workspace: &str, var: &Variable) -> Result<(), WriteError> {
        let existing = self.list_variables(workspace).await?;

        let attributes = serde_json::json!({
            "key": var.key,
            "value": var.value.expose_secret(),
            "category": "env",
            "sensitive": var.sensitive,
            "description": VARIABLE_DESCRIPTION,
        });

        let response = match existing.data.iter().find(|v| v.attributes.key == var.key) {
            Some(found) => {
                tracing::debug!(
                    workspace = workspace,
                    key = %var.key,
                    variable_id = %found.id,
                    "updating existing workspace variable in place"
                );
                self.client
                    .patch(format!("{}/workspaces/{}/vars/{}", self.api_url, workspace, found.id))
                    .bearer_auth(self.token.expose_secret())
                    .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
                    .json(&serde_json::json!({
                        "data": { "type": "vars", "id": found.id, "attributes": attributes }
                    }))
                    .send()
                    .await
            }
            None => {
                self.client
                    .post(format!("{}/workspaces/{}/vars", self.api_url, workspace))
                    .bearer_auth(self.token.expose_secret())
                    .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
                    .json(&serde_json::json!({
                        "data": { "type": "vars", "attributes": attributes }
                    }))
                    .send()
                    .await
            }
        }
        .map_err(|source| WriteError::Transport { platform: PLATFORM, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WriteError::UnexpectedStatus { platform: PLATFORM, status: status.as_u16() });
        }
        Ok(())
    }

    async fn list_variables(&self, workspace: &str) -> Result<WorkspaceVariables, WriteError> {
        let response = self
            .client
            .get(format!("{}/workspaces/{}/vars", self.api_url, workspace))
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .send()
            .await
            .map_err(|source| WriteError::Transport { platform: PLATFORM, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WriteError::UnexpectedStatus { platform: PLATFORM, status: status.as_u16() });
        }

        response
            .json::<WorkspaceVariables>()
            .await
            .map_err(|source| WriteError::Decode { platform: PLATFORM, source })
    }
}

#[async_trait]
impl Destination for TfCloudDestination {
    fn platform(&self) -> Platform {
        Platform::TfCloud
    }

    async fn apply(&self, binding: &Binding, vars: &[Variable]) -> Result<(), WriteError> {
        for var in vars {
            self.set_variable(&binding.remote_id, var).await?;
        }
        Ok(())
    }
}
