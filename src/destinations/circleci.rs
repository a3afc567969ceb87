//! CircleCI destination: direct environment-variable create calls.
//!
//! The CircleCI v2 API treats `POST .../envvar` as an idempotent overwrite,
//! so no list/update pass is needed. Rate-limit responses are recognized and
//! logged with the reset hint the API provides, but the call is not retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::error::WriteError;
use super::{build_http_client, Destination, Variable};
use crate::errors::Error;
use crate::rotation::{Binding, Platform};
use crate::vault::SecretString;

/// Production CircleCI API endpoint.
pub const DEFAULT_API_URL: &str = "https://circleci.com/api/v2";

const PLATFORM: &str = "circleci";

/// Writes project environment variables through the CircleCI v2 API.
pub struct CircleCiDestination {
    client: reqwest::Client,
    api_url: String,
    token: SecretString,
}

impl CircleCiDestination {
    /// Create an adapter authenticating with the given personal API token.
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

    /// Create or overwrite one environment variable in a project.
    ///
    /// `project` is the VCS slug without the `gh/` prefix, matching how
    /// bindings are configured.
    pub async fn set_variable(&self, project: &str, var: &Variable) -> Result<(), WriteError> {
        let url = format!("{}/project/gh/{}/envvar", self.api_url, project);

        let response = self
            .client
            .post(&url)
            .header("Circle-Token", self.token.expose_secret())
            .json(&serde_json::json!({
                "name": var.key,
                "value": var.value.expose_secret(),
            }))
            .send()
            .await
            .map_err(|source| WriteError::Transport { platform: PLATFORM, source })?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(()),
            StatusCode::TOO_MANY_REQUESTS => {
                let reset_hint = rate_limit_hint(response.headers());
                tracing::warn!(
                    project = project,
                    key = %var.key,
                    reset_hint = ?reset_hint,
                    "CircleCI rate limit hit; giving up on this variable"
                );
                Err(WriteError::RateLimited { platform: PLATFORM, reset_hint })
            }
            status => {
                Err(WriteError::UnexpectedStatus { platform: PLATFORM, status: status.as_u16() })
            }
        }
    }
}

/// Pull the reset hint out of a rate-limited response's headers.
fn rate_limit_hint(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get("retry-after")
        .or_else(|| headers.get("x-ratelimit-reset"))
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

#[async_trait]
impl Destination for CircleCiDestination {
    fn platform(&self) -> Platform {
        Platform::CircleCi
    }

    async fn apply(&self, binding: &Binding, vars: &[Variable]) -> Result<(), WriteError> {
        for var in vars {
            self.set_variable(&binding.remote_id, var).await?;
        }
        Ok(())
    }
}
