//! Vault integration: session validation and credential issuance.
//!
//! The broker session is refreshed exactly once per rotation cycle by a
//! token self-lookup, then shared read-only by every concurrent dispatch
//! task in that cycle. Each binding receives its own freshly minted token,
//! scoped either to the binding's Vault role or to its explicit policy
//! list, always with an explicit TTL.
//!
//! # Security
//!
//! - Minted tokens are wrapped in [`SecretString`] and zeroed on drop
//! - Token values are never logged
//! - The session token itself never leaves this module

pub mod error;
pub mod session;
pub mod types;

pub use error::{IssuanceError, SessionError};
pub use session::{refresh_session, CredentialScope, SessionConfig, VaultSession};
pub use types::{Credential, SecretString};
