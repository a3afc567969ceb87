//! # Structured Logging
//!
//! tracing-subscriber initialization for the rotation service. Credential
//! values never reach a log line; the secret wrapper types redact themselves
//! and the dispatcher only logs lease metadata.

use tracing_subscriber::EnvFilter;

use crate::errors::{Error, Result};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`. With `json` set, log
/// lines are emitted as structured JSON for log shippers.
pub fn init_logging(default_level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if json { builder.json().try_init() } else { builder.try_init() };

    result.map_err(|e| Error::config(format!("Failed to initialize logging: {}", e)))
}
