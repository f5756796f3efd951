//! Configuration for the operator.
//!
//! One explicit struct built once at startup and passed by reference into
//! the engine; reconciliation logic never reads the environment itself.

use std::time::Duration;

use anyhow::Result;
use iset_reconcile::DEFAULT_RESYNC_INTERVAL;

/// Operator configuration.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Interval between periodic resync passes.
    pub resync_interval: Duration,

    /// How long a switchover may stay in flight before the transition is
    /// abandoned for the pass and retried. Overridable per set via its
    /// membership reconfiguration.
    pub switchover_timeout: Duration,

    /// Transient failures tolerated per set within `retry_window` before
    /// the set is reported degraded.
    pub max_retries: u32,

    /// Rolling window for transient failure accounting.
    pub retry_window: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            switchover_timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_window: Duration::from_secs(10 * 60),
            log_level: "info".to_string(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let resync_interval = std::env::var("ISET_RESYNC_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.resync_interval);

        let switchover_timeout = std::env::var("ISET_SWITCHOVER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.switchover_timeout);

        let max_retries = std::env::var("ISET_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_retries);

        let retry_window = std::env::var("ISET_RETRY_WINDOW_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.retry_window);

        let log_level = std::env::var("ISET_LOG_LEVEL").unwrap_or(defaults.log_level);

        Ok(Self {
            resync_interval,
            switchover_timeout,
            max_retries,
            retry_window,
            log_level,
        })
    }
}
