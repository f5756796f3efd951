//! Reconciliation primitives.
//!
//! Building blocks shared by level-triggered controllers that converge
//! observed state toward a declared spec:
//!
//! - [`Revision`]: content fingerprint of a resolved spec, for staleness
//!   detection only (never ordering or identity).
//! - [`BackoffPolicy`]: capped exponential delays for transient failures.
//! - [`TransitionWindow`]: a bounded wait on an in-flight state
//!   transition, re-derivable from a persisted start stamp.
//! - [`FailureWindow`]: per-key failure accounting within a rolling
//!   window.
//!
//! # Invariants
//!
//! - Fingerprints are deterministic: equal values hash equally regardless
//!   of field order in the source.
//! - Nothing here performs I/O; callers decide when to act.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from revision handling.
#[derive(Debug, Error)]
pub enum RevisionError {
    /// The value could not be serialized for hashing.
    #[error("cannot fingerprint value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A content fingerprint of a resolved spec.
///
/// Computed as SHA-256 over the canonical JSON encoding of the value
/// (serde_json orders map keys, so field order in the source never leaks
/// into the hash). Truncated to 128 bits; used purely to detect change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(String);

impl Revision {
    /// Fingerprint any serializable value.
    pub fn of<T: Serialize>(value: &T) -> Result<Self, RevisionError> {
        let bytes = serde_json::to_vec(value)?;
        let digest = Sha256::digest(&bytes);
        Ok(Self(hex::encode(&digest[..16])))
    }

    /// Wrap an already-computed fingerprint string (e.g. read back from
    /// an instance annotation).
    pub fn from_stored(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The fingerprint as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capped exponential backoff for retrying transient failures.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,

    /// Upper bound on any delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Delay for the given attempt number (0-based), doubling each
    /// attempt up to the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.min(31);
        self.base.saturating_mul(1u32 << shift).min(self.max)
    }
}

/// A bounded wait on an in-flight transition (e.g. a switchover).
///
/// The start stamp is expected to be persisted in status so the window
/// survives process restarts; nothing here lives only in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionWindow {
    /// When the transition was initiated.
    pub started_at: DateTime<Utc>,

    /// How long to wait before abandoning the transition for this pass.
    pub timeout: Duration,
}

impl TransitionWindow {
    /// Open a window starting at `started_at`.
    pub fn new(started_at: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            started_at,
            timeout,
        }
    }

    /// True once `now` has passed the deadline.
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.timeout) {
            Ok(timeout) => now - self.started_at >= timeout,
            Err(_) => false,
        }
    }

    /// Time remaining before the deadline, zero if already expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let elapsed = (now - self.started_at).to_std().unwrap_or_default();
        self.timeout.saturating_sub(elapsed)
    }
}

/// Per-key failure accounting within a rolling window.
///
/// Callers record failures as they happen and ask whether a key has
/// exhausted its budget; successes clear the key.
#[derive(Debug, Clone)]
pub struct FailureWindow {
    max_failures: u32,
    window: Duration,
    failures: BTreeMap<String, (u32, Instant)>,
}

impl FailureWindow {
    /// Track up to `max_failures` per key within `window`.
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            max_failures,
            window,
            failures: BTreeMap::new(),
        }
    }

    /// Record a failure; returns true once the key's budget is exhausted.
    pub fn record(&mut self, key: &str) -> bool {
        let now = Instant::now();
        let entry = self.failures.entry(key.to_string()).or_insert((0, now));
        if now.duration_since(entry.1) > self.window {
            *entry = (0, now);
        }
        entry.0 += 1;
        entry.0 > self.max_failures
    }

    /// Consecutive failures recorded for the key within the window.
    pub fn count(&self, key: &str) -> u32 {
        match self.failures.get(key) {
            Some((count, first)) if first.elapsed() <= self.window => *count,
            _ => 0,
        }
    }

    /// Clear the key after a success.
    pub fn clear(&mut self, key: &str) {
        self.failures.remove(key);
    }

    /// Drop entries whose window has passed.
    pub fn prune(&mut self) {
        let window = self.window;
        self.failures.retain(|_, (_, first)| first.elapsed() <= window);
    }
}

/// Default periodic resync interval for level-triggered controllers.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);
