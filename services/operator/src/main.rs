//! InstanceSet Operator
//!
//! Reconciles role-aware, stateful replica sets of workload instances
//! toward their declared shape.
//!
//! The binary wires the engine against the in-memory store (real
//! deployments embed the library and provide their platform's
//! `ObjectStore` and `SwitchoverActuator`).

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use iset_identity::{InstanceName, SetRef};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use iset_operator::memory::MemoryStore;
use iset_operator::spec::SwitchoverSpec;
use iset_operator::store::{LogEventSink, StoreError, SwitchoverActuator};
use iset_operator::worker::OperatorWorker;
use iset_operator::OperatorConfig;

/// Actuator stand-in for local runs: announces the request and trusts
/// the operator to observe the role report.
struct LogSwitchover;

#[async_trait]
impl SwitchoverActuator for LogSwitchover {
    async fn begin_switchover(
        &self,
        set: &SetRef,
        from: &InstanceName,
        to: Option<&InstanceName>,
        _spec: &SwitchoverSpec,
    ) -> Result<(), StoreError> {
        warn!(set = %set, from = %from, to = ?to.map(|t| t.to_string()), "No real actuator wired; switchover logged only");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting InstanceSet operator");

    let config = OperatorConfig::from_env()?;
    info!(
        resync_interval_secs = config.resync_interval.as_secs(),
        switchover_timeout_secs = config.switchover_timeout.as_secs(),
        "Configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let store = Arc::new(MemoryStore::new());
    let mut worker = OperatorWorker::new(
        config,
        store,
        Arc::new(LogSwitchover),
        Arc::new(LogEventSink),
    );

    let worker_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            worker.run(shutdown_rx).await;
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = worker_handle => {
            info!("Worker exited");
        }
    }

    let _ = shutdown_tx.send(true);
    info!("Operator shutdown complete");
    Ok(())
}
