//! The rotation scheduler: fixed-interval cycles and one-shot mode.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::{Error, Result};
use crate::observability::Metrics;
use crate::vault::{refresh_session, SessionConfig};

use super::dispatcher::Dispatcher;

/// Drives rotation cycles: refresh the session, fan out, sleep, repeat.
///
/// The interval is fixed regardless of failures; a failed session refresh
/// skips dispatch for that cycle and the next tick retries. The next tick is
/// armed only after the previous cycle's barrier completes, so cycles never
/// overlap.
pub struct Scheduler {
    dispatcher: Dispatcher,
    session: SessionConfig,
    metrics: Arc<Metrics>,
    interval: Duration,
    drain_timeout: Duration,
}

impl Scheduler {
    pub fn new(
        dispatcher: Dispatcher,
        session: SessionConfig,
        metrics: Arc<Metrics>,
        config: &AppConfig,
    ) -> Self {
        Self {
            dispatcher,
            session,
            metrics,
            interval: config.refresh_interval(),
            drain_timeout: config.drain_timeout(),
        }
    }

    /// Run cycles until the shutdown token fires.
    ///
    /// On shutdown mid-cycle the cycle's scope is cancelled and in-flight
    /// dispatches are awaited up to the drain deadline before returning.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            interval_minutes = self.interval.as_secs() / 60,
            bindings = self.dispatcher.binding_count(),
            "starting rotation loop"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let cycle = self.run_cycle(shutdown.child_token());
            tokio::pin!(cycle);

            tokio::select! {
                _ = &mut cycle => {}
                _ = shutdown.cancelled() => {
                    info!("shutdown requested; draining in-flight dispatches");
                    if tokio::time::timeout(self.drain_timeout, &mut cycle).await.is_err() {
                        warn!(
                            drain_timeout_seconds = self.drain_timeout.as_secs(),
                            "drain deadline exceeded; abandoning in-flight dispatches"
                        );
                    }
                    break;
                }
            }
        }

        info!("rotation loop stopped");
    }

    /// Perform exactly one cycle and aggregate the counters into the result.
    ///
    /// Used by external schedulers (cron jobs and the like) that manage
    /// their own periodicity: any recorded error makes the process exit
    /// nonzero.
    pub async fn run_once(&self) -> Result<()> {
        info!(bindings = self.dispatcher.binding_count(), "running a single rotation cycle");

        self.run_cycle(CancellationToken::new()).await;

        let errors = self.metrics.errors_total();
        if errors > 0 {
            return Err(Error::CycleFailed { errors });
        }
        Ok(())
    }

    /// One pass: refresh the session, then dispatch to every binding.
    ///
    /// A refresh failure means zero dispatch attempts for this cycle.
    async fn run_cycle(&self, cancel: CancellationToken) {
        let span = tracing::info_span!("rotation_cycle", cycle_id = %Uuid::new_v4());

        async {
            match refresh_session(&self.session).await {
                Ok(session) => {
                    self.metrics.record_session_ok();
                    self.dispatcher.dispatch_cycle(Arc::new(session), cancel).await;
                }
                Err(err) => {
                    self.metrics.record_session_error();
                    error!(
                        error = %err,
                        "unable to obtain a valid session; skipping dispatch for this cycle"
                    );
                }
            }
        }
        .instrument(span)
        .await
    }
}
