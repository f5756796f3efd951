//! Runtime records for instances and their persistent claims.
//!
//! These are the engine's view of what the store holds: never authored by
//! users directly, always derived from a resolved template.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use iset_identity::{ClaimName, InstanceName};
use iset_reconcile::Revision;

use crate::spec::InstanceTemplateSpec;

/// Coarse lifecycle phase reported by the instance executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstancePhase {
    Pending,
    Running,
    Failed,
    Terminating,
}

/// One running (or starting) unit of the set.
#[derive(Debug, Clone)]
pub struct Instance {
    /// Stable identity, unique within the set for its lifetime.
    pub name: InstanceName,

    /// Labels the instance carries; always a superset of the set's
    /// selector labels.
    pub labels: BTreeMap<String, String>,

    /// Concrete specification the instance was created (or last patched)
    /// with.
    pub spec: InstanceTemplateSpec,

    /// Fingerprint of `spec`, for staleness detection.
    pub revision: Revision,

    /// Fingerprint of the replacement-requiring subset of `spec`
    /// (storage and resource shape); gates in-place updates.
    pub placement: Revision,

    pub phase: InstancePhase,

    pub ready: bool,

    /// When the instance last became ready; gates availability.
    pub ready_since: Option<DateTime<Utc>>,

    /// Role last reported by the workload, if any.
    pub reported_role: Option<String>,

    /// Claims attached to this instance.
    pub storage: Vec<ClaimName>,

    /// Optimistic-concurrency token.
    pub resource_version: u64,
}

impl Instance {
    /// Ready, and ready long enough to count as available.
    pub fn available(&self, min_ready: Duration, now: DateTime<Utc>) -> bool {
        if !self.ready {
            return false;
        }
        if min_ready.is_zero() {
            return true;
        }
        match self.ready_since {
            Some(since) => match chrono::Duration::from_std(min_ready) {
                Ok(min_ready) => now - since >= min_ready,
                Err(_) => false,
            },
            None => false,
        }
    }

    /// The instance is being created or torn down.
    pub fn in_flux(&self) -> bool {
        matches!(self.phase, InstancePhase::Pending | InstancePhase::Terminating)
    }
}

/// A persistent claim owned by the set, addressed by identity so a
/// retained claim can be re-adopted by a future instance with the same
/// name.
#[derive(Debug, Clone)]
pub struct Claim {
    pub name: ClaimName,
    pub storage_bytes: u64,
    pub storage_class: Option<String>,
    pub resource_version: u64,
}
