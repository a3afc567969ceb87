//! Error types for destination write operations.

use thiserror::Error;

/// A destination upsert failed for one binding/variable.
///
/// Binding-local: the remaining steps for that binding are skipped but
/// sibling bindings proceed. None of these variants ever escapes the
/// dispatch task boundary; each becomes a counter increment and a log line.
#[derive(Error, Debug)]
pub enum WriteError {
    /// The HTTP request could not be completed (connect, timeout, TLS).
    #[error("request to {platform} failed")]
    Transport {
        platform: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The remote answered with a status outside the expected set.
    #[error("{platform} returned unexpected status {status}")]
    UnexpectedStatus { platform: &'static str, status: u16 },

    /// A recognized rate-limit response. Logged with its reset hint but not
    /// retried; the call still fails.
    #[error("{platform} rate limit hit (reset hint: {reset_hint:?})")]
    RateLimited { platform: &'static str, reset_hint: Option<String> },

    /// The remote's response body could not be decoded.
    #[error("could not decode {platform} response")]
    Decode {
        platform: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The remote reported errors inside an otherwise successful response.
    #[error("{platform} rejected the request: {message}")]
    Remote { platform: &'static str, message: String },

    /// The per-binding token exchange produced no usable bearer token.
    #[error("{platform} token exchange returned an empty bearer token")]
    EmptyExchangeToken { platform: &'static str },
}
