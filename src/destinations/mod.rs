//! Destination adapters: one per platform family.
//!
//! Every adapter exposes the same capability (upsert a named variable,
//! optionally marked sensitive, into a uniquely identified remote target)
//! and a cycle-scoped [`Destination::apply`] entry point the dispatcher
//! drives with the two variables of a rotation (the minted token and the
//! broker address).
//!
//! Families differ in wire semantics:
//! - [`CircleCiDestination`] issues a direct create call the remote treats
//!   as an overwrite.
//! - [`TfCloudDestination`] performs a true list/update/create upsert.
//! - [`SpaceliftDestination`] exchanges an API key for a bearer token once
//!   per binding per cycle and batches all variables into one mutation.

pub mod circleci;
pub mod error;
pub mod spacelift;
pub mod tfcloud;

pub use circleci::CircleCiDestination;
pub use error::WriteError;
pub use spacelift::SpaceliftDestination;
pub use tfcloud::TfCloudDestination;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Error;
use crate::rotation::{Binding, Platform};
use crate::vault::SecretString;

/// One environment variable to deliver to a remote target.
#[derive(Debug, Clone)]
pub struct Variable {
    pub key: String,
    pub value: SecretString,
    /// Marked sensitive/write-only on platforms that support it.
    pub sensitive: bool,
}

impl Variable {
    /// A variable whose value must be hidden from readers on the remote side.
    pub fn sensitive(key: impl Into<String>, value: SecretString) -> Self {
        Self { key: key.into(), value, sensitive: true }
    }

    /// A plainly readable variable.
    pub fn plain(key: impl Into<String>, value: impl Into<SecretString>) -> Self {
        Self { key: key.into(), value: value.into(), sensitive: false }
    }
}

/// Capability contract every platform family satisfies.
#[async_trait]
pub trait Destination: Send + Sync {
    /// The platform family this adapter writes to.
    fn platform(&self) -> Platform;

    /// Deliver a cycle's variables to one binding's remote target, in slice
    /// order. A failure on any variable short-circuits the remaining ones
    /// for this binding only; sibling bindings are unaffected.
    async fn apply(&self, binding: &Binding, vars: &[Variable]) -> Result<(), WriteError>;
}

/// Build the HTTP client shared by an adapter's calls for the process
/// lifetime, with the uniform per-call timeout.
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::config_with_source("Failed to build HTTP client", Box::new(e)))
}
