//! # Vaultflow
//!
//! Vaultflow periodically mints short-lived, scoped HashiCorp Vault tokens and
//! fans them out, as named environment variables, into CircleCI projects,
//! Terraform Cloud workspaces, and Spacelift stacks. Pipelines on those
//! platforms authenticate with a fresh token every cycle instead of holding a
//! long-lived secret.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler → refresh session → Dispatcher → {destination adapters in parallel}
//!     ↓                                               ↓
//! Admin HTTP (/metrics, /health)              Metrics registry
//! ```
//!
//! ## Core Components
//!
//! - **Vault session** ([`vault`]): validates the broker token once per cycle
//!   and mints one credential per binding.
//! - **Destination adapters** ([`destinations`]): upsert variables into each
//!   platform behind a common capability trait.
//! - **Rotation engine** ([`rotation`]): the interval scheduler and the
//!   concurrent per-binding dispatcher with total failure isolation.
//! - **Observability** ([`observability`]): an explicit counter registry plus
//!   the Prometheus/health HTTP surface.

pub mod cli;
pub mod config;
pub mod destinations;
pub mod errors;
pub mod observability;
pub mod rotation;
pub mod vault;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
