//! The binding model: one configured destination for a rotated credential.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::vault::CredentialScope;

/// Destination platform families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    CircleCi,
    TfCloud,
    Spacelift,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::CircleCi => "circleci",
            Platform::TfCloud => "tfcloud",
            Platform::Spacelift => "spacelift",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One destination that should receive a fresh credential each cycle.
///
/// Unique per platform + remote identifier. Built from configuration at
/// startup and immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Binding {
    pub platform: Platform,

    /// The remote target: a CircleCI project slug, a Terraform Cloud
    /// workspace ID, or a Spacelift stack name.
    pub remote_id: String,

    /// Optional human-friendly name used in logs instead of the remote ID.
    pub display_name: Option<String>,

    /// Vault role to mint this binding's tokens against.
    pub vault_role: Option<String>,

    /// Policies attached to this binding's tokens.
    pub vault_policies: Vec<String>,
}

impl Binding {
    /// The identifier used in log lines: the display name when configured,
    /// otherwise the remote ID.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.remote_id)
    }

    /// The credential scoping parameters for this binding.
    pub fn scope(&self) -> CredentialScope {
        CredentialScope { role: self.vault_role.clone(), policies: self.vault_policies.clone() }
    }
}
