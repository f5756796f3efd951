//! External interface boundary.
//!
//! The engine never talks to a concrete platform directly: everything it
//! consumes (the declarative object store, the event sink, and the
//! switchover actuator) is a trait defined here. All mutation uses
//! optimistic concurrency (conditional on the last-seen resource
//! version) so two stale passes cannot silently clobber each other.

use std::collections::BTreeMap;

use async_trait::async_trait;
use iset_identity::{ClaimName, InstanceName, SetRef};
use thiserror::Error;

use crate::instance::{Claim, Instance};
use crate::spec::{InstanceSet, SwitchoverSpec};
use crate::status::InstanceSetStatus;

/// Errors from the external store and actuators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A resource with this identity already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The conditional write lost: the resource changed since it was
    /// read. The pass must reload and retry rather than overwrite.
    #[error("conflict: {0} changed since last read")]
    Conflict(String),

    /// The store (or actuator) is temporarily unreachable.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Transient errors are retried with backoff; the rest indicate a
    /// logic or state problem the next pass re-derives.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Conflict(_))
    }
}

/// Declarative object store for sets, instances, and claims.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_sets(&self) -> Result<Vec<InstanceSet>, StoreError>;

    async fn get_set(&self, set: &SetRef) -> Result<InstanceSet, StoreError>;

    /// Conditional status write; returns the new resource version.
    async fn update_status(
        &self,
        set: &SetRef,
        expected_version: u64,
        status: InstanceSetStatus,
    ) -> Result<u64, StoreError>;

    /// Remove a finalized set object. Claims retained by policy survive
    /// it, still addressable by identity.
    async fn remove_set(&self, set: &SetRef, expected_version: u64) -> Result<(), StoreError>;

    /// Live instances carrying the selector labels.
    async fn list_instances(
        &self,
        set: &SetRef,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Instance>, StoreError>;

    async fn create_instance(&self, set: &SetRef, instance: Instance) -> Result<(), StoreError>;

    /// In-place update of a running instance's spec and fingerprints.
    async fn patch_instance(
        &self,
        set: &SetRef,
        name: &InstanceName,
        expected_version: u64,
        instance: Instance,
    ) -> Result<(), StoreError>;

    async fn delete_instance(
        &self,
        set: &SetRef,
        name: &InstanceName,
        expected_version: u64,
    ) -> Result<(), StoreError>;

    async fn list_claims(&self, set: &SetRef) -> Result<Vec<Claim>, StoreError>;

    async fn create_claim(&self, set: &SetRef, claim: Claim) -> Result<(), StoreError>;

    /// Idempotent: deleting an absent claim succeeds.
    async fn delete_claim(&self, set: &SetRef, name: &ClaimName) -> Result<(), StoreError>;
}

/// Best-effort human-readable operational notices. Non-authoritative:
/// failures to record are never surfaced to the reconcile flow.
pub trait EventSink: Send + Sync {
    fn record(&self, set: &SetRef, kind: EventKind, reason: &str, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// Event reasons recorded by the reconciler.
pub mod reasons {
    pub const INSTANCE_CREATED: &str = "InstanceCreated";
    pub const INSTANCE_DELETED: &str = "InstanceDeleted";
    pub const INSTANCE_PATCHED: &str = "InstancePatched";
    pub const CLAIM_DELETED: &str = "ClaimDeleted";
    pub const SWITCHOVER_STARTED: &str = "SwitchoverStarted";
    pub const SWITCHOVER_COMPLETED: &str = "SwitchoverCompleted";
    pub const SWITCHOVER_OVERDUE: &str = "SwitchoverOverdue";
    pub const SWITCHOVER_UNCONFIGURED: &str = "SwitchoverUnconfigured";
    pub const INVALID_SPEC: &str = "InvalidSpec";
    pub const SET_FINALIZED: &str = "SetFinalized";
}

/// Workload-specific switchover action. The actuator only initiates the
/// move; completion is observed through the role-report channel on a
/// later pass.
#[async_trait]
pub trait SwitchoverActuator: Send + Sync {
    async fn begin_switchover(
        &self,
        set: &SetRef,
        from: &InstanceName,
        to: Option<&InstanceName>,
        spec: &SwitchoverSpec,
    ) -> Result<(), StoreError>;
}

/// Event sink that writes structured log lines.
#[derive(Debug, Default, Clone)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn record(&self, set: &SetRef, kind: EventKind, reason: &str, message: &str) {
        match kind {
            EventKind::Normal => {
                tracing::info!(set = %set, reason, message, "Event");
            }
            EventKind::Warning => {
                tracing::warn!(set = %set, reason, message, "Event");
            }
        }
    }
}
