//! Vault session refresh and per-binding token issuance.

use std::path::{Path, PathBuf};
use std::time::Duration;

use vaultrs::api::token::requests::{
    CreateOrphanTokenRequestBuilder, CreateRoleTokenRequestBuilder, CreateTokenRequestBuilder,
};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::token;

use super::error::{IssuanceError, SessionError};
use super::types::{Credential, SecretString};

/// Environment variable holding the broker session token when no token file
/// is configured.
const TOKEN_ENV: &str = "VAULT_TOKEN";

/// How a cycle's session is obtained.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Vault server address, e.g. `https://vault.example.com:8200`.
    pub address: String,

    /// Optional file holding the session token. Takes precedence over the
    /// `VAULT_TOKEN` environment variable; contents are trimmed before use.
    pub token_file: Option<PathBuf>,

    /// Uniform request timeout applied to every Vault call.
    pub request_timeout: Duration,
}

/// Scoping parameters for one binding's credential.
#[derive(Debug, Clone, Default)]
pub struct CredentialScope {
    /// Token role to mint against, if configured. When present, issuance
    /// goes through the role-scoped create endpoint.
    pub role: Option<String>,

    /// Policies attached to the minted token.
    pub policies: Vec<String>,
}

/// A validated broker identity, refreshed once per cycle and shared
/// read-only by every dispatch task in that cycle.
pub struct VaultSession {
    client: VaultClient,
    address: String,
}

/// Obtain and validate a session for the coming cycle.
///
/// Resolves the token material (file first, then environment), builds a
/// client and proves the token is usable with a self-lookup. Any failure is
/// a [`SessionError`] and aborts the cycle before a single credential is
/// minted.
pub async fn refresh_session(config: &SessionConfig) -> Result<VaultSession, SessionError> {
    let token = resolve_token_material(config.token_file.as_deref()).await?;

    let settings = VaultClientSettingsBuilder::default()
        .address(&config.address)
        .token(token.expose_secret())
        .timeout(Some(config.request_timeout))
        .build()
        .map_err(|e| SessionError::Client { message: e.to_string() })?;

    let client =
        VaultClient::new(settings).map_err(|e| SessionError::Client { message: e.to_string() })?;

    let lookup = token::lookup_self(&client).await.map_err(|source| {
        tracing::debug!(error = %source, "token self-lookup rejected");
        SessionError::LookupFailed { source }
    })?;

    tracing::debug!(policies = ?lookup.policies, "validated Vault session token");

    Ok(VaultSession { client, address: config.address.clone() })
}

/// Read the session token from the token file (trimmed) or the environment.
async fn resolve_token_material(token_file: Option<&Path>) -> Result<SecretString, SessionError> {
    let raw = match token_file {
        Some(path) => {
            tracing::debug!(path = %path.display(), "reading session token from file");
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| SessionError::TokenFile { path: path.to_path_buf(), source })?
        }
        None => std::env::var(TOKEN_ENV).unwrap_or_default(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SessionError::MissingToken);
    }
    Ok(SecretString::new(trimmed))
}

impl VaultSession {
    /// Address of the Vault server this session talks to, propagated to
    /// destinations alongside each minted token.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Mint a fresh token for one binding.
    ///
    /// The TTL is always sent explicitly; the broker's own default is never
    /// relied on. With a role the role-scoped endpoint is used; otherwise
    /// the explicit policy list applies, optionally as an orphan token that
    /// outlives this session.
    pub async fn issue(
        &self,
        scope: &CredentialScope,
        ttl: Duration,
        orphan: bool,
    ) -> Result<Credential, IssuanceError> {
        let ttl_arg = format!("{}s", ttl.as_secs());

        let auth = if let Some(role) = &scope.role {
            let mut opts = CreateRoleTokenRequestBuilder::default();
            opts.ttl(ttl_arg);
            if !scope.policies.is_empty() {
                opts.policies(scope.policies.clone());
            }
            token::new_role(&self.client, role, Some(&mut opts))
                .await
                .map_err(|source| IssuanceError::Broker { source })?
        } else if orphan {
            let mut opts = CreateOrphanTokenRequestBuilder::default();
            opts.ttl(ttl_arg);
            if !scope.policies.is_empty() {
                opts.policies(scope.policies.clone());
            }
            token::new_orphan(&self.client, Some(&mut opts))
                .await
                .map_err(|source| IssuanceError::Broker { source })?
        } else {
            let mut opts = CreateTokenRequestBuilder::default();
            opts.ttl(ttl_arg);
            if !scope.policies.is_empty() {
                opts.policies(scope.policies.clone());
            }
            token::new(&self.client, Some(&mut opts))
                .await
                .map_err(|source| IssuanceError::Broker { source })?
        };

        if auth.client_token.is_empty() {
            return Err(IssuanceError::EmptyToken);
        }

        Ok(Credential {
            token: SecretString::new(auth.client_token),
            lease_duration: auth.lease_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_token_material_from_file_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  hvs.file-token\n").unwrap();

        let token = resolve_token_material(Some(file.path())).await.unwrap();
        assert_eq!(token.expose_secret(), "hvs.file-token");
    }

    #[tokio::test]
    async fn test_whitespace_only_file_is_missing_token() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "   \n\t").unwrap();

        let err = resolve_token_material(Some(file.path())).await.unwrap_err();
        assert!(matches!(err, SessionError::MissingToken));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_session_error() {
        let err = resolve_token_material(Some(Path::new("/nonexistent/vault-token")))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::TokenFile { .. }));
    }

    #[test]
    fn test_credential_scope_default_is_unscoped() {
        let scope = CredentialScope::default();
        assert!(scope.role.is_none());
        assert!(scope.policies.is_empty());
    }
}
