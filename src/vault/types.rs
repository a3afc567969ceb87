//! Secure types for handling sensitive data.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string wrapper that redacts its contents in Debug and Display output.
///
/// Used for minted Vault tokens and destination API credentials so that a
/// stray log line or panic message can never leak a secret. The actual value
/// is only reachable through [`SecretString::expose_secret`], and the backing
/// memory is overwritten with zeros when the value is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    /// Creates a new SecretString from a string value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Exposes the underlying secret value.
    ///
    /// Only call this at the point the value crosses a wire boundary
    /// (request body, auth header). Never log or print the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Returns the length of the secret without exposing the value.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Default for SecretString {
    fn default() -> Self {
        Self::new("")
    }
}

/// A short-lived token minted for exactly one binding in exactly one cycle.
///
/// The value is never persisted; the credential is dropped (and its memory
/// zeroed) as soon as dispatch for its binding completes.
#[derive(Clone)]
pub struct Credential {
    /// The minted client token.
    pub token: SecretString,

    /// Lease duration granted by Vault, in seconds.
    pub lease_duration: u64,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &self.token)
            .field("lease_duration", &self.lease_duration)
            .finish()
    }
}
