//! # Observability Infrastructure
//!
//! Structured logging, the explicit rotation-counter registry, and the admin
//! HTTP surface (`/metrics`, `/health`).

pub mod http;
pub mod logging;
pub mod metrics;

pub use http::{build_router, AdminState};
pub use logging::init_logging;
pub use metrics::{install_prometheus_exporter, register_metrics, Metrics};
