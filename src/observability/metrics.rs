//! # Metrics Collection
//!
//! An explicit counter registry shared by reference between the scheduler,
//! the dispatcher, and the admin HTTP surface. Every increment is mirrored
//! into the `metrics` facade so the Prometheus exporter renders it, while
//! the atomic fields back the decisions the process itself makes (health
//! state, one-shot aggregation) without scraping its own exporter.
//!
//! Counters only ever go up; nothing is reset for the process lifetime.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use metrics::{counter, describe_counter, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::HealthWindow;
use crate::errors::{Error, Result};
use crate::rotation::Platform;

const ERRORS_TOTAL: &str = "vaultflow_errors_total";
const SESSION_ERRORS_TOTAL: &str = "vaultflow_session_errors_total";
const ISSUANCE_ERRORS_TOTAL: &str = "vaultflow_issuance_errors_total";

const CIRCLECI_ERRORS_TOTAL: &str = "vaultflow_circleci_errors_total";
const CIRCLECI_UPDATES_TOTAL: &str = "vaultflow_circleci_updates_total";
const TFCLOUD_ERRORS_TOTAL: &str = "vaultflow_tfcloud_errors_total";
const TFCLOUD_UPDATES_TOTAL: &str = "vaultflow_tfcloud_updates_total";
const SPACELIFT_ERRORS_TOTAL: &str = "vaultflow_spacelift_errors_total";
const SPACELIFT_UPDATES_TOTAL: &str = "vaultflow_spacelift_updates_total";

#[derive(Debug, Default)]
struct FamilyCounters {
    errors: AtomicU64,
    updates: AtomicU64,
}

/// Process-wide rotation counters.
///
/// Incremented only from within the dispatcher and scheduler, never
/// decremented.
#[derive(Debug)]
pub struct Metrics {
    errors: AtomicU64,
    session_errors: AtomicU64,
    issuance_errors: AtomicU64,
    circleci: FamilyCounters,
    tfcloud: FamilyCounters,
    spacelift: FamilyCounters,
    /// Outcome of the most recent session refresh, for the
    /// [`HealthWindow::CurrentCycle`] health mode. Healthy until the first
    /// refresh attempt reports otherwise.
    last_refresh_ok: AtomicBool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            errors: AtomicU64::new(0),
            session_errors: AtomicU64::new(0),
            issuance_errors: AtomicU64::new(0),
            circleci: FamilyCounters::default(),
            tfcloud: FamilyCounters::default(),
            spacelift: FamilyCounters::default(),
            last_refresh_ok: AtomicBool::new(true),
        }
    }

    fn family(&self, platform: Platform) -> &FamilyCounters {
        match platform {
            Platform::CircleCi => &self.circleci,
            Platform::TfCloud => &self.tfcloud,
            Platform::Spacelift => &self.spacelift,
        }
    }

    fn family_counter_names(platform: Platform) -> (&'static str, &'static str) {
        match platform {
            Platform::CircleCi => (CIRCLECI_ERRORS_TOTAL, CIRCLECI_UPDATES_TOTAL),
            Platform::TfCloud => (TFCLOUD_ERRORS_TOTAL, TFCLOUD_UPDATES_TOTAL),
            Platform::Spacelift => (SPACELIFT_ERRORS_TOTAL, SPACELIFT_UPDATES_TOTAL),
        }
    }

    /// A session refresh/validation failed; the cycle's dispatch was skipped.
    pub fn record_session_error(&self) {
        self.session_errors.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.last_refresh_ok.store(false, Ordering::Relaxed);
        counter!(SESSION_ERRORS_TOTAL).increment(1);
        counter!(ERRORS_TOTAL).increment(1);
    }

    /// A session refresh succeeded. Only the current-cycle health window
    /// reacts to this; the counters are untouched.
    pub fn record_session_ok(&self) {
        self.last_refresh_ok.store(true, Ordering::Relaxed);
    }

    /// Credential minting failed for one binding.
    pub fn record_issuance_error(&self) {
        self.issuance_errors.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!(ISSUANCE_ERRORS_TOTAL).increment(1);
        counter!(ERRORS_TOTAL).increment(1);
    }

    /// A destination write failed for one binding.
    pub fn record_write_error(&self, platform: Platform) {
        self.family(platform).errors.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
        let (errors_name, _) = Self::family_counter_names(platform);
        counter!(errors_name).increment(1);
        counter!(ERRORS_TOTAL).increment(1);
    }

    /// One binding's variables were fully delivered.
    pub fn record_update(&self, platform: Platform) {
        self.family(platform).updates.fetch_add(1, Ordering::Relaxed);
        let (_, updates_name) = Self::family_counter_names(platform);
        counter!(updates_name).increment(1);
    }

    /// A dispatch task died without reporting an outcome.
    pub fn record_dispatch_panic(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!(ERRORS_TOTAL).increment(1);
    }

    pub fn errors_total(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn session_errors(&self) -> u64 {
        self.session_errors.load(Ordering::Relaxed)
    }

    pub fn issuance_errors(&self) -> u64 {
        self.issuance_errors.load(Ordering::Relaxed)
    }

    pub fn write_errors(&self, platform: Platform) -> u64 {
        self.family(platform).errors.load(Ordering::Relaxed)
    }

    pub fn updates(&self, platform: Platform) -> u64 {
        self.family(platform).updates.load(Ordering::Relaxed)
    }

    /// Whether the liveness signal reports healthy under the given window.
    pub fn is_healthy(&self, window: HealthWindow) -> bool {
        match window {
            HealthWindow::Cumulative => self.session_errors() == 0,
            HealthWindow::CurrentCycle => self.last_refresh_ok.load(Ordering::Relaxed),
        }
    }
}

/// Install the Prometheus exporter and return the render handle for the
/// `/metrics` route. Call at most once per process.
pub fn install_prometheus_exporter() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::config(format!("Failed to install metrics exporter: {}", e)))
}

/// Describe all counters and zero-initialize them so every series is
/// present in the first scrape, before any event occurs.
pub fn register_metrics() {
    describe_counter!(ERRORS_TOTAL, Unit::Count, "Total number of errors encountered");
    describe_counter!(
        SESSION_ERRORS_TOTAL,
        Unit::Count,
        "Number of failed Vault session refreshes"
    );
    describe_counter!(
        ISSUANCE_ERRORS_TOTAL,
        Unit::Count,
        "Number of failed per-binding token creations"
    );
    describe_counter!(
        CIRCLECI_ERRORS_TOTAL,
        Unit::Count,
        "Number of errors encountered when calling the CircleCI API"
    );
    describe_counter!(CIRCLECI_UPDATES_TOTAL, Unit::Count, "Number of CircleCI projects updated");
    describe_counter!(
        TFCLOUD_ERRORS_TOTAL,
        Unit::Count,
        "Number of errors encountered when calling the Terraform Cloud API"
    );
    describe_counter!(
        TFCLOUD_UPDATES_TOTAL,
        Unit::Count,
        "Number of Terraform Cloud workspaces updated"
    );
    describe_counter!(
        SPACELIFT_ERRORS_TOTAL,
        Unit::Count,
        "Number of errors encountered when calling the Spacelift API"
    );
    describe_counter!(SPACELIFT_UPDATES_TOTAL, Unit::Count, "Number of Spacelift stacks updated");

    counter!(ERRORS_TOTAL).absolute(0);
    counter!(SESSION_ERRORS_TOTAL).absolute(0);
    counter!(ISSUANCE_ERRORS_TOTAL).absolute(0);
    counter!(CIRCLECI_ERRORS_TOTAL).absolute(0);
    counter!(CIRCLECI_UPDATES_TOTAL).absolute(0);
    counter!(TFCLOUD_ERRORS_TOTAL).absolute(0);
    counter!(TFCLOUD_UPDATES_TOTAL).absolute(0);
    counter!(SPACELIFT_ERRORS_TOTAL).absolute(0);
    counter!(SPACELIFT_UPDATES_TOTAL).absolute(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();

        metrics.record_update(Platform::CircleCi);
        metrics.record_update(Platform::CircleCi);
        metrics.record_update(Platform::TfCloud);
        metrics.record_write_error(Platform::Spacelift);
        metrics.record_issuance_error();

        assert_eq!(metrics.updates(Platform::CircleCi), 2);
        assert_eq!(metrics.updates(Platform::TfCloud), 1);
        assert_eq!(metrics.updates(Platform::Spacelift), 0);
        assert_eq!(metrics.write_errors(Platform::Spacelift), 1);
        assert_eq!(metrics.issuance_errors(), 1);
        assert_eq!(metrics.errors_total(), 2);
    }

    #[test]
    fn test_session_errors_feed_total() {
        let metrics = Metrics::new();
        metrics.record_session_error();

        assert_eq!(metrics.session_errors(), 1);
        assert_eq!(metrics.errors_total(), 1);
    }

    #[test]
    fn test_cumulative_health_never_recovers() {
        let metrics = Metrics::new();
        assert!(metrics.is_healthy(HealthWindow::Cumulative));

        metrics.record_session_error();
        assert!(!metrics.is_healthy(HealthWindow::Cumulative));

        // A later successful refresh does not clear the cumulative signal.
        metrics.record_session_ok();
        assert!(!metrics.is_healthy(HealthWindow::Cumulative));
    }

    #[test]
    fn test_current_cycle_health_recovers() {
        let metrics = Metrics::new();
        assert!(metrics.is_healthy(HealthWindow::CurrentCycle));

        metrics.record_session_error();
        assert!(!metrics.is_healthy(HealthWindow::CurrentCycle));

        metrics.record_session_ok();
        assert!(metrics.is_healthy(HealthWindow::CurrentCycle));
    }

    #[test]
    fn test_issuance_errors_do_not_degrade_health() {
        let metrics = Metrics::new();
        metrics.record_issuance_error();
        metrics.record_write_error(Platform::CircleCi);

        assert!(metrics.is_healthy(HealthWindow::Cumulative));
        assert!(metrics.is_healthy(HealthWindow::CurrentCycle));
    }
}
