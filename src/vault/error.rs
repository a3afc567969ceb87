//! Error types for Vault session and issuance operations.

use std::path::PathBuf;
use thiserror::Error;
use vaultrs::error::ClientError;

/// Session refresh or validation failed.
///
/// Cycle-fatal: the scheduler skips dispatch entirely for the cycle and
/// retries at the next tick.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No token material was available from the token file or environment.
    #[error("no Vault token available: provide a token file or set VAULT_TOKEN")]
    MissingToken,

    /// The configured token file could not be read.
    #[error("vault token file '{path}' could not be read")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The Vault client could not be constructed from the configured address.
    #[error("invalid Vault client configuration: {message}")]
    Client { message: String },

    /// The token self-lookup was rejected; the session token is assumed invalid.
    #[error("token self-lookup failed, assuming the session token is invalid")]
    LookupFailed {
        #[source]
        source: ClientError,
    },
}

/// Credential minting failed for one binding.
///
/// Binding-local: sibling bindings in the same cycle are unaffected.
#[derive(Error, Debug)]
pub enum IssuanceError {
    /// Vault rejected the token-create request.
    #[error("token creation was rejected by Vault")]
    Broker {
        #[source]
        source: ClientError,
    },

    /// Vault answered the create request without a usable client token.
    #[error("Vault returned an empty client token")]
    EmptyToken,
}
