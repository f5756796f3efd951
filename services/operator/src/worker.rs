//! Background worker running the reconciliation loop.
//!
//! Level-triggered: every tick lists the InstanceSets and reconciles
//! each in turn. Passes for one object are serialized (single-flight)
//! because the worker drives them sequentially; different objects share
//! nothing but the read-only configuration. Transient failures are
//! tracked per set and backed off; one failing set never blocks the
//! rest.

use std::sync::Arc;
use std::time::Duration;

use iset_reconcile::{BackoffPolicy, FailureWindow};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::OperatorConfig;
use crate::reconciler::{Outcome, ReconcileError, Reconciler};
use crate::store::{EventSink, ObjectStore, SwitchoverActuator};

/// Statistics from one sweep over all sets.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStats {
    pub sets_processed: u32,
    pub sets_failed: u32,
    pub instances_created: u32,
    pub instances_deleted: u32,
    pub instances_patched: u32,
    pub switchovers_started: u32,
}

/// The operator worker.
pub struct OperatorWorker<S, A, E> {
    reconciler: Reconciler<S, A, E>,
    store: Arc<S>,
    resync_interval: Duration,
    backoff: BackoffPolicy,
    failures: FailureWindow,
}

impl<S, A, E> OperatorWorker<S, A, E>
where
    S: ObjectStore,
    A: SwitchoverActuator,
    E: EventSink,
{
    pub fn new(config: OperatorConfig, store: Arc<S>, actuator: Arc<A>, events: Arc<E>) -> Self {
        let resync_interval = config.resync_interval;
        let failures = FailureWindow::new(config.max_retries, config.retry_window);
        Self {
            reconciler: Reconciler::new(config, Arc::clone(&store), actuator, events),
            store,
            resync_interval,
            backoff: BackoffPolicy::default(),
            failures,
        }
    }

    /// Run the reconciliation loop until shutdown is signaled.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            resync_interval_secs = self.resync_interval.as_secs(),
            "Starting reconciliation loop"
        );

        let mut interval = tokio::time::interval(self.resync_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let stats = self.reconcile_all().await;
                    if stats.sets_failed > 0 || stats.instances_created > 0
                        || stats.instances_deleted > 0 || stats.instances_patched > 0
                    {
                        info!(
                            sets_processed = stats.sets_processed,
                            sets_failed = stats.sets_failed,
                            instances_created = stats.instances_created,
                            instances_deleted = stats.instances_deleted,
                            instances_patched = stats.instances_patched,
                            switchovers_started = stats.switchovers_started,
                            "Reconciliation sweep complete"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One sweep over every set.
    #[instrument(skip(self))]
    pub async fn reconcile_all(&mut self) -> WorkerStats {
        let mut stats = WorkerStats::default();

        let sets = match self.store.list_sets().await {
            Ok(sets) => sets,
            Err(err) => {
                warn!(error = %err, "Failed to list sets, will retry");
                stats.sets_failed += 1;
                return stats;
            }
        };
        debug!(set_count = sets.len(), "Sweeping sets");

        for set in sets {
            let set_ref = set.set_ref();
            let key = set_ref.to_string();
            match self.reconciler.reconcile(&set_ref).await {
                Ok(summary) => {
                    self.failures.clear(&key);
                    stats.sets_processed += 1;
                    stats.instances_created += summary.created;
                    stats.instances_deleted += summary.deleted;
                    stats.instances_patched += summary.patched;
                    stats.switchovers_started += summary.switchovers_started;
                    if summary.outcome == Outcome::AwaitingRoleTransition {
                        debug!(set = %set_ref, "Awaiting role transition");
                    }
                }
                Err(ReconcileError::Store(err)) if err.is_transient() => {
                    stats.sets_failed += 1;
                    let exhausted = self.failures.record(&key);
                    let attempt = self.failures.count(&key);
                    let delay = self.backoff.delay(attempt.saturating_sub(1));
                    if exhausted {
                        error!(set = %set_ref, error = %err, "Retries exhausted; set degraded until the store recovers");
                    } else {
                        warn!(
                            set = %set_ref,
                            error = %err,
                            retry_in_ms = delay.as_millis(),
                            "Transient failure, will retry"
                        );
                    }
                }
                Err(err) => {
                    stats.sets_failed += 1;
                    error!(set = %set_ref, error = %err, "Reconcile failed");
                }
            }
        }

        self.failures.prune();
        stats
    }
}
