//! Observed-state reporting for an InstanceSet.
//!
//! Status is the only part of the object the reconciler writes. Condition
//! transition times are preserved when a condition's value does not
//! change, so consumers can tell how long a state has held.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status block persisted on the InstanceSet object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstanceSetStatus {
    /// Spec generation this status was computed from.
    pub observed_generation: i64,

    /// Instances that currently exist.
    pub replicas: u32,

    /// Instances reporting ready.
    pub ready_replicas: u32,

    /// Ready instances that have stayed ready for `minReadySeconds`.
    pub available_replicas: u32,

    /// Instances whose revision matches the update revision.
    pub updated_replicas: u32,

    /// Revision the set has fully converged on.
    pub current_revision: Option<String>,

    /// Revision the set is converging toward.
    pub update_revision: Option<String>,

    /// Reported member count per role name.
    pub role_members: BTreeMap<String, u32>,

    /// In-flight planned switchover, recoverable across restarts.
    pub switchover: Option<SwitchoverStatus>,

    /// Per-instance status surfaced for inspection.
    pub instances: Vec<InstanceSummary>,

    pub conditions: Vec<Condition>,
}

impl InstanceSetStatus {
    /// Set a condition, preserving the transition time when the value is
    /// unchanged.
    pub fn set_condition(
        &mut self,
        kind: ConditionKind,
        value: bool,
        reason: &str,
        message: &str,
        now: DateTime<Utc>,
    ) {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.kind == kind) {
            let transition = if existing.value == value {
                existing.last_transition_time
            } else {
                now
            };
            existing.value = value;
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.last_transition_time = transition;
        } else {
            self.conditions.push(Condition {
                kind,
                value,
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: now,
            });
        }
    }

    /// Look up a condition by kind.
    pub fn condition(&self, kind: ConditionKind) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.kind == kind)
    }

    /// True when the given condition holds.
    pub fn is(&self, kind: ConditionKind) -> bool {
        self.condition(kind).is_some_and(|c| c.value)
    }
}

/// A planned switchover that has been initiated but not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchoverStatus {
    /// Instance currently holding the role.
    pub instance: String,

    /// Role being moved.
    pub role: String,

    /// When the actuator was last invoked; bounds the wait.
    pub started_at: DateTime<Utc>,
}

/// Per-instance observed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub name: String,
    pub revision: String,
    pub role: Option<String>,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub kind: ConditionKind,
    pub value: bool,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionKind {
    /// All desired instances exist, are available, and role cardinality
    /// holds.
    Ready,

    /// Instances are being created, replaced, or patched.
    Updating,

    /// A switchover is in flight or overdue.
    RoleTransitionPending,

    /// The spec passed validation; false is terminal until edited.
    ConfigurationValid,
}
