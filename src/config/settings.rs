//! # Configuration Settings
//!
//! Defines the configuration structure for the rotation service, loaded from
//! a YAML file and validated before the first cycle.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{Error, Result};
use crate::rotation::{Binding, Platform};

fn default_token_variable() -> String {
    "VAULT_TOKEN".to_string()
}

fn default_token_ttl_minutes() -> u64 {
    60
}

fn default_refresh_interval_minutes() -> u64 {
    30
}

fn default_max_concurrent_dispatches() -> usize {
    8
}

fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_drain_timeout_seconds() -> u64 {
    20
}

fn default_metrics_port() -> u16 {
    4329
}

/// How long a session failure keeps `/health` degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HealthWindow {
    /// Degraded forever once any session error has occurred since process
    /// start.
    #[default]
    Cumulative,
    /// Degraded only while the most recent refresh attempt failed.
    CurrentCycle,
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// Address of the Vault server used for session validation and token
    /// minting, propagated to destinations as `VAULT_ADDR`.
    #[validate(length(min = 1, message = "vault_address cannot be empty"))]
    pub vault_address: String,

    /// Variable name the minted token is written under.
    #[serde(default = "default_token_variable")]
    #[validate(length(min = 1, message = "token_variable cannot be empty"))]
    pub token_variable: String,

    /// TTL of minted tokens, in minutes. Always sent explicitly to Vault.
    #[serde(default = "default_token_ttl_minutes")]
    #[validate(range(min = 1, message = "token_ttl_minutes must be at least 1"))]
    pub token_ttl_minutes: u64,

    /// Interval between rotation cycles, in minutes.
    #[serde(default = "default_refresh_interval_minutes")]
    #[validate(range(min = 1, message = "refresh_interval_minutes must be at least 1"))]
    pub refresh_interval_minutes: u64,

    /// Mint orphan tokens that outlive the issuing session.
    #[serde(default)]
    pub orphan_tokens: bool,

    /// Cap on concurrently running per-binding dispatch tasks.
    #[serde(default = "default_max_concurrent_dispatches")]
    #[validate(range(min = 1, max = 256, message = "max_concurrent_dispatches must be 1..=256"))]
    pub max_concurrent_dispatches: usize,

    /// Uniform timeout applied to every Vault and destination call, in
    /// seconds.
    #[serde(default = "default_request_timeout_seconds")]
    #[validate(range(min = 1, max = 300, message = "request_timeout_seconds must be 1..=300"))]
    pub request_timeout_seconds: u64,

    /// How long shutdown waits for in-flight dispatches, in seconds.
    #[serde(default = "default_drain_timeout_seconds")]
    pub drain_timeout_seconds: u64,

    /// Degradation window for the `/health` signal.
    #[serde(default)]
    pub health_window: HealthWindow,

    /// Port for the admin endpoints in continuous mode. `0` disables them.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// CircleCI projects to rotate tokens into.
    #[serde(default)]
    #[validate(nested)]
    pub circleci: Vec<CircleCiBinding>,

    /// Terraform Cloud workspaces to rotate tokens into.
    #[serde(default)]
    #[validate(nested)]
    pub tfcloud: Vec<TfCloudBinding>,

    /// Spacelift stacks to rotate tokens into.
    #[serde(default)]
    #[validate(nested)]
    pub spacelift: Vec<SpaceliftBinding>,
}

/// A CircleCI project receiving a rotated token.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CircleCiBinding {
    /// Project slug without the VCS prefix, e.g. `acme/deploy-tools`.
    #[validate(length(min = 1, message = "project name cannot be empty"))]
    pub name: String,

    /// Vault role to mint this project's tokens against.
    pub vault_role: Option<String>,

    /// Policies attached to this project's tokens.
    #[serde(default)]
    pub vault_policies: Vec<String>,
}

/// A Terraform Cloud workspace receiving a rotated token.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TfCloudBinding {
    /// Workspace ID. Must begin with `ws-`.
    #[validate(length(min = 1, message = "workspace cannot be empty"))]
    pub workspace: String,

    /// Optional display name used in logs instead of the workspace ID.
    pub name: Option<String>,

    /// Vault role to mint this workspace's tokens against.
    pub vault_role: Option<String>,

    /// Policies attached to this workspace's tokens.
    #[serde(default)]
    pub vault_policies: Vec<String>,
}

/// A Spacelift stack receiving a rotated token.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SpaceliftBinding {
    /// Stack name in the tenant.
    #[validate(length(min = 1, message = "stack cannot be empty"))]
    pub stack: String,

    /// Vault role to mint this stack's tokens against.
    pub vault_role: Option<String>,

    /// Policies attached to this stack's tokens.
    #[serde(default)]
    pub vault_policies: Vec<String>,
}

impl AppConfig {
    /// Load and validate configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::io(e, format!("reading configuration file '{}'", path.display())))?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    /// Custom validation logic that goes beyond what the validator crate can do
    fn validate_custom(&self) -> Result<()> {
        for binding in &self.tfcloud {
            if !binding.workspace.starts_with("ws-") {
                return Err(Error::config(format!(
                    "tfcloud workspace '{}' is not a workspace ID (expected a 'ws-' prefix)",
                    binding.workspace
                )));
            }
        }
        Ok(())
    }

    /// Total number of configured bindings across all families.
    pub fn binding_count(&self) -> usize {
        self.circleci.len() + self.tfcloud.len() + self.spacelift.len()
    }

    /// Get the token TTL as a Duration
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_minutes * 60)
    }

    /// Get the cycle interval as a Duration
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_minutes * 60)
    }

    /// Get the per-call timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the shutdown drain deadline as a Duration
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }

    /// Get the admin bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<SocketAddr> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
        }
    }
}

impl From<&CircleCiBinding> for Binding {
    fn from(config: &CircleCiBinding) -> Self {
        Binding {
            platform: Platform::CircleCi,
            remote_id: config.name.clone(),
            display_name: None,
            vault_role: config.vault_role.clone(),
            vault_policies: config.vault_policies.clone(),
        }
    }
}

impl From<&TfCloudBinding> for Binding {
    fn from(config: &TfCloudBinding) -> Self {
        Binding {
            platform: Platform::TfCloud,
            remote_id: config.workspace.clone(),
            display_name: config.name.clone(),
            vault_role: config.vault_role.clone(),
            vault_policies: config.vault_policies.clone(),
        }
    }
}

impl From<&SpaceliftBinding> for Binding {
    fn from(config: &SpaceliftBinding) -> Self {
        Binding {
            platform: Platform::Spacelift,
            remote_id: config.stack.clone(),
            display_name: None,
            vault_role: config.vault_role.clone(),
            vault_policies: config.vault_policies.clone(),
        }
    }
}
