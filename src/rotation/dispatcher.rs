//! Concurrent per-binding dispatch with total failure isolation.
//!
//! Each cycle, every binding gets its own task: mint a credential, then
//! deliver it (plus the broker address) through the binding's destination
//! adapter. Tasks run concurrently under a semaphore cap and a per-cycle
//! cancellation scope; the cycle's barrier completes only when every task
//! has finished. No error crosses a task boundary; each becomes a counter
//! increment and a log line.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::destinations::{Destination, Variable};
use crate::observability::Metrics;
use crate::vault::VaultSession;

use super::binding::Binding;

/// Fixed variable name carrying the broker's network address, written
/// alongside every rotated token.
pub const BROKER_ADDRESS_VARIABLE: &str = "VAULT_ADDR";

/// Pairs one binding with the adapter that can write to it.
#[derive(Clone)]
pub struct BindingRoute {
    pub binding: Binding,
    pub destination: Arc<dyn Destination>,
}

/// Fans a cycle's session out over every configured binding.
pub struct Dispatcher {
    routes: Vec<BindingRoute>,
    metrics: Arc<Metrics>,
    limiter: Arc<Semaphore>,
    token_variable: String,
    token_ttl: Duration,
    orphan_tokens: bool,
}

impl Dispatcher {
    pub fn new(routes: Vec<BindingRoute>, metrics: Arc<Metrics>, config: &AppConfig) -> Self {
        Self {
            routes,
            metrics,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_dispatches)),
            token_variable: config.token_variable.clone(),
            token_ttl: config.token_ttl(),
            orphan_tokens: config.orphan_tokens,
        }
    }

    /// Number of bindings this dispatcher serves.
    pub fn binding_count(&self) -> usize {
        self.routes.len()
    }

    /// Run one cycle's fan-out and block until every per-binding task has
    /// finished, success or failure.
    ///
    /// The session is shared read-only across all tasks. Cancelling the
    /// token stops tasks at their next await point; outcomes of cancelled
    /// tasks are not counted.
    pub async fn dispatch_cycle(&self, session: Arc<VaultSession>, cancel: CancellationToken) {
        let mut tasks: JoinSet<()> = JoinSet::new();

        for route in &self.routes {
            let binding = route.binding.clone();
            let destination = Arc::clone(&route.destination);
            let session = Arc::clone(&session);
            let metrics = Arc::clone(&self.metrics);
            let limiter = Arc::clone(&self.limiter);
            let cancel = cancel.clone();
            let token_variable = self.token_variable.clone();
            let token_ttl = self.token_ttl;
            let orphan = self.orphan_tokens;

            tasks.spawn(async move {
                dispatch_binding(
                    binding,
                    destination,
                    session,
                    metrics,
                    limiter,
                    cancel,
                    token_variable,
                    token_ttl,
                    orphan,
                )
                .await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(join_error) = joined {
                // A panicking task must not poison its siblings or the cycle.
                self.metrics.record_dispatch_panic();
                error!(error = %join_error, "dispatch task aborted unexpectedly");
            }
        }
    }
}

/// One binding's unit of work within a cycle.
#[allow(clippy::too_many_arguments)]
async fn dispatch_binding(
    binding: Binding,
    destination: Arc<dyn Destination>,
    session: Arc<VaultSession>,
    metrics: Arc<Metrics>,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
    token_variable: String,
    token_ttl: Duration,
    orphan: bool,
) {
    let _permit = tokio::select! {
        _ = cancel.cancelled() => return,
        permit = limiter.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return,
        },
    };

    let scope = binding.scope();
    let credential = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(platform = %binding.platform, target = binding.label(), "cycle cancelled before issuance");
            return;
        }
        issued = session.issue(&scope, token_ttl, orphan) => match issued {
            Ok(credential) => credential,
            Err(err) => {
                metrics.record_issuance_error();
                error!(
                    platform = %binding.platform,
                    target = binding.label(),
                    error = %err,
                    "credential issuance failed"
                );
                return;
            }
        },
    };

    debug!(
        platform = %binding.platform,
        target = binding.label(),
        lease_duration = credential.lease_duration,
        "minted credential for binding"
    );

    // Credential value first, broker address second. The credential is
    // dropped (and zeroed) when this task returns.
    let vars = [
        Variable::sensitive(token_variable, credential.token.clone()),
        Variable::plain(BROKER_ADDRESS_VARIABLE, session.address()),
    ];

    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(platform = %binding.platform, target = binding.label(), "cycle cancelled before delivery");
        }
        written = destination.apply(&binding, &vars) => match written {
            Ok(()) => {
                metrics.record_update(binding.platform);
                info!(
                    platform = %binding.platform,
                    target = binding.label(),
                    variable = %vars[0].key,
                    "updated destination variables"
                );
            }
            Err(err) => {
                metrics.record_write_error(binding.platform);
                error!(
                    platform = %binding.platform,
                    target = binding.label(),
                    error = %err,
                    "failed to update destination"
                );
            }
        },
    }
}
