//! InstanceSet object model and spec validation.
//!
//! The spec is a plain, immutable-once-built value. There is no fluent
//! builder: callers assemble an [`InstanceSetSpec`] (all fields have
//! serde-backed defaults) and construct the object through the single
//! validating factory [`InstanceSet::new`]. The reconciler re-validates
//! on every pass so spec edits that introduce conflicts surface as a
//! terminal condition instead of half-applied actions.

use std::collections::{BTreeMap, BTreeSet};

use iset_identity::{IdError, SetRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::InstanceSetStatus;

/// Configuration conflicts. Terminal for the current spec generation:
/// surfaced as a status condition and not retried until the spec changes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("identity: {0}")]
    Identity(#[from] IdError),

    #[error("selector labels must not be empty")]
    EmptySelector,

    #[error("base template image must not be empty")]
    MissingImage,

    #[error("duplicate role '{0}'")]
    DuplicateRole(String),

    #[error("roles '{first}' and '{second}' both claim an exclusive read-write seat")]
    ConflictingExclusiveRoles { first: String, second: String },

    #[error("membership reconfiguration is configured but no role is exclusive")]
    SwitchoverWithoutExclusiveRole,

    #[error("duplicate instance template '{0}'")]
    DuplicateTemplate(String),

    #[error(
        "instance template '{template}' lists {ordinals} explicit ordinals but asks for {replicas} replicas"
    )]
    OrdinalCountMismatch {
        template: String,
        ordinals: usize,
        replicas: u32,
    },

    #[error("instance template '{template}' repeats explicit ordinal {ordinal}")]
    RepeatedOrdinal { template: String, ordinal: u32 },

    #[error("instance templates claim {claimed} instances but the set asks for {replicas}")]
    OverSubscribed { claimed: u32, replicas: u32 },

    #[error("ordinal {ordinal} is claimed by templates '{first}' and '{second}'")]
    OrdinalConflict {
        ordinal: u32,
        first: String,
        second: String,
    },

    #[error("offline instance '{name}' does not belong to this set")]
    BadOfflineName { name: String },

    #[error("identity '{identity}' is claimed by more than one template")]
    AmbiguousTemplate { identity: String },

    #[error("identity '{identity}' matches no instance template")]
    UnknownTemplate { identity: String },

    #[error("cannot fingerprint resolved spec: {0}")]
    Fingerprint(String),
}

/// Object metadata, maintained by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,

    /// Bumped by the store on every spec change.
    pub generation: i64,

    /// Optimistic-concurrency token; bumped on every write.
    pub resource_version: u64,

    /// Set once the caller asks for cascading deletion.
    pub deletion_requested: bool,
}

/// The desired-state object: metadata + spec + status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSet {
    pub meta: ObjectMeta,
    pub spec: InstanceSetSpec,
    pub status: InstanceSetStatus,
}

impl InstanceSet {
    /// The single validating factory. The returned object is well-formed:
    /// every conflict detectable without observed state has been rejected.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        spec: InstanceSetSpec,
    ) -> Result<Self, SpecError> {
        let set_ref = SetRef::new(namespace, name)?;
        spec.validate(&set_ref.name)?;
        Ok(Self {
            meta: ObjectMeta {
                namespace: set_ref.namespace,
                name: set_ref.name,
                generation: 1,
                resource_version: 0,
                deletion_requested: false,
            },
            spec,
            status: InstanceSetStatus::default(),
        })
    }

    /// Reference to this object.
    pub fn set_ref(&self) -> SetRef {
        SetRef {
            namespace: self.meta.namespace.clone(),
            name: self.meta.name.clone(),
        }
    }
}

fn default_replicas() -> u32 {
    1
}

/// Desired shape of the set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstanceSetSpec {
    /// Target instance count.
    #[serde(default = "default_replicas")]
    pub replicas: u32,

    /// Immutable label set identifying member instances.
    pub selector_labels: BTreeMap<String, String>,

    /// Default instance specification.
    pub base_template: InstanceTemplateSpec,

    /// Ordered role definitions for the workload's membership protocol.
    pub roles: Vec<RoleSpec>,

    /// Per-instance overrides; at most one template claims any identity.
    pub instance_templates: Vec<InstanceTemplate>,

    /// `$(VAR)` substitutions applied to rendered templates.
    pub template_vars: BTreeMap<String, String>,

    /// Identities excluded from desired membership (drained, not deleted).
    pub offline_instances: BTreeSet<String>,

    /// When true, ordinals are one flat sequence across all templates;
    /// when false, each template has its own sequence starting at zero.
    pub flat_instance_ordinal: bool,

    /// Switchover action descriptor, required before the engine may
    /// disrupt the holder of an exclusive role.
    pub membership_reconfiguration: Option<MembershipReconfiguration>,

    /// Which instances are eligible for automatic update, and in what
    /// ordinal order.
    pub instance_update_strategy: InstanceUpdateStrategy,

    /// Update ordering relative to roles.
    pub member_update_strategy: MemberUpdateStrategy,

    /// Whether stale instances are patched in place when possible or
    /// always replaced.
    pub instance_update_policy: InstanceUpdatePolicy,

    /// Whether instance creation/deletion proceeds serially or in
    /// parallel.
    pub pod_management_policy: PodManagementPolicy,

    /// Concurrency bound for parallel management; defaults to the full
    /// replica count when unset.
    pub parallel_pod_management_concurrency: Option<Concurrency>,

    /// Claim disposition on scale-down and on set deletion.
    pub persistent_volume_claim_retention_policy: ClaimRetentionPolicy,

    /// Seconds an instance must stay ready before it counts as available.
    pub min_ready_seconds: u32,

    /// Suspends all create/update/delete actions; status reporting
    /// continues.
    pub paused: bool,
}

impl Default for InstanceSetSpec {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            selector_labels: BTreeMap::new(),
            base_template: InstanceTemplateSpec::default(),
            roles: Vec::new(),
            instance_templates: Vec::new(),
            template_vars: BTreeMap::new(),
            offline_instances: BTreeSet::new(),
            flat_instance_ordinal: false,
            membership_reconfiguration: None,
            instance_update_strategy: InstanceUpdateStrategy::default(),
            member_update_strategy: MemberUpdateStrategy::default(),
            instance_update_policy: InstanceUpdatePolicy::default(),
            pod_management_policy: PodManagementPolicy::default(),
            parallel_pod_management_concurrency: None,
            persistent_volume_claim_retention_policy: ClaimRetentionPolicy::default(),
            min_ready_seconds: 0,
            paused: false,
        }
    }
}

impl InstanceSetSpec {
    /// Validate every conflict detectable from the spec alone.
    ///
    /// Ordinal-level conflicts that depend on allocation (overlapping
    /// explicit claims in flat mode) are reported by the allocator.
    pub fn validate(&self, set_name: &str) -> Result<(), SpecError> {
        if self.selector_labels.is_empty() {
            return Err(SpecError::EmptySelector);
        }
        if self.base_template.image.is_empty() {
            return Err(SpecError::MissingImage);
        }

        let mut role_names = BTreeSet::new();
        let mut exclusive_rw: Option<&str> = None;
        for role in &self.roles {
            if !role_names.insert(role.name.as_str()) {
                return Err(SpecError::DuplicateRole(role.name.clone()));
            }
            if role.cardinality == RoleCardinality::ExactlyOne
                && role.access == AccessMode::ReadWrite
            {
                if let Some(first) = exclusive_rw {
                    return Err(SpecError::ConflictingExclusiveRoles {
                        first: first.to_string(),
                        second: role.name.clone(),
                    });
                }
                exclusive_rw = Some(&role.name);
            }
        }

        if self.membership_reconfiguration.is_some()
            && !self.roles.iter().any(RoleSpec::exclusive)
        {
            return Err(SpecError::SwitchoverWithoutExclusiveRole);
        }

        let mut template_names = BTreeSet::new();
        let mut claimed = 0u32;
        for template in &self.instance_templates {
            if !template_names.insert(template.name.as_str()) {
                return Err(SpecError::DuplicateTemplate(template.name.clone()));
            }
            let mut seen = BTreeSet::new();
            for &ordinal in &template.ordinals {
                if !seen.insert(ordinal) {
                    return Err(SpecError::RepeatedOrdinal {
                        template: template.name.clone(),
                        ordinal,
                    });
                }
            }
            if !template.ordinals.is_empty() {
                if let Some(replicas) = template.replicas {
                    if replicas as usize != template.ordinals.len() {
                        return Err(SpecError::OrdinalCountMismatch {
                            template: template.name.clone(),
                            ordinals: template.ordinals.len(),
                            replicas,
                        });
                    }
                }
            }
            claimed += template.claim_count();
        }
        if claimed > self.replicas {
            return Err(SpecError::OverSubscribed {
                claimed,
                replicas: self.replicas,
            });
        }

        for name in &self.offline_instances {
            iset_identity::InstanceName::parse(set_name, name).map_err(|_| {
                SpecError::BadOfflineName { name: name.clone() }
            })?;
        }

        Ok(())
    }

    /// Look up a role definition by name.
    pub fn role(&self, name: &str) -> Option<&RoleSpec> {
        self.roles.iter().find(|r| r.name == name)
    }
}

/// A role the workload's membership protocol can assign to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    pub name: String,
    pub access: AccessMode,
    pub cardinality: RoleCardinality,
}

impl RoleSpec {
    /// Exclusive roles gate disruptive actions behind a switchover.
    pub fn exclusive(&self) -> bool {
        self.cardinality != RoleCardinality::Any
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoleCardinality {
    ExactlyOne,
    AtMostOne,
    Any,
}

/// The concrete per-instance specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstanceTemplateSpec {
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub env: Vec<EnvVar>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub resources: Resources,
    pub volume_claim_templates: Vec<VolumeClaimTemplate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Resources {
    pub cpu_millis: u32,
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaimTemplate {
    pub name: String,
    pub storage_bytes: u64,
    #[serde(default)]
    pub storage_class: Option<String>,
}

/// A per-instance override entry: claims a subset of identities and
/// overrides fields of the base template for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstanceTemplate {
    pub name: String,

    /// Instances drawn from this template when `ordinals` is empty.
    pub replicas: Option<u32>,

    /// Explicit ordinals to pin instead of sequential allocation.
    pub ordinals: Vec<u32>,

    pub overrides: TemplateOverride,
}

impl Default for InstanceTemplate {
    fn default() -> Self {
        Self {
            name: String::new(),
            replicas: None,
            ordinals: Vec::new(),
            overrides: TemplateOverride::default(),
        }
    }
}

impl InstanceTemplate {
    /// How many identities this template claims out of `spec.replicas`.
    pub fn claim_count(&self) -> u32 {
        if self.ordinals.is_empty() {
            self.replicas.unwrap_or(1)
        } else {
            self.ordinals.len() as u32
        }
    }
}

/// Strict field-level override of the base template.
///
/// Scalars and list fields (`command`, `args`, `env`,
/// `volumeClaimTemplates`) replace the base value wholesale when set.
/// `labels` and `annotations` are the only additive fields: they merge
/// onto the base maps with the override winning per key. Unknown keys
/// are rejected at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct TemplateOverride {
    pub image: Option<String>,
    pub command: Option<Vec<String>>,
    pub args: Option<Vec<String>>,
    pub env: Option<Vec<EnvVar>>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub resources: Option<Resources>,
    pub volume_claim_templates: Option<Vec<VolumeClaimTemplate>>,
}

/// How to ask the workload to move its exclusive role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipReconfiguration {
    pub switchover: SwitchoverSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchoverSpec {
    /// Workload-specific action, executed by the switchover actuator.
    pub command: Vec<String>,

    /// Per-set override of the operator's switchover timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Which instances are eligible for automatic update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstanceUpdateStrategy {
    /// Update stale instances automatically; ordinals below `partition`
    /// are held back.
    RollingUpdate { partition: u32 },

    /// Never update automatically; instances pick up the new template
    /// only when deleted by the caller.
    OnDelete,
}

impl Default for InstanceUpdateStrategy {
    fn default() -> Self {
        Self::RollingUpdate { partition: 0 }
    }
}

/// Update ordering relative to roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberUpdateStrategy {
    /// One member at a time, exclusive-role holders last.
    #[default]
    Serial,

    /// Non-exclusive members in parallel, exclusive holders last.
    BestEffortParallel,

    /// No role-based ordering; the switchover gate still applies.
    Parallel,
}

/// Whether stale instances may be patched in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstanceUpdatePolicy {
    /// Patch in place when the change does not require replacement
    /// (storage and resource shape unchanged); otherwise recreate.
    #[default]
    PreferInPlace,

    /// Always delete and recreate.
    Recreate,
}

/// Whether creation/deletion proceeds serially or in parallel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PodManagementPolicy {
    /// One instance at a time; later ordinals wait for earlier ones to
    /// become available.
    #[default]
    OrderedReady,

    /// Up to the configured concurrency in flight at once.
    Parallel,
}

/// Absolute or percentage concurrency bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Concurrency {
    Count(u32),
    Percent(u8),
}

impl Concurrency {
    /// Effective bound for a set of `replicas` instances, never below 1.
    pub fn resolve(&self, replicas: u32) -> u32 {
        match *self {
            Concurrency::Count(n) => n.max(1),
            Concurrency::Percent(p) => {
                let scaled = (replicas as u64 * p.min(100) as u64) / 100;
                (scaled as u32).max(1)
            }
        }
    }
}

/// Claim disposition, independently configurable for scale-down and for
/// whole-set deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClaimRetentionPolicy {
    pub when_scaled: RetainPolicy,
    pub when_deleted: RetainPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetainPolicy {
    #[default]
    Retain,
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled_spec() -> InstanceSetSpec {
        InstanceSetSpec {
            selector_labels: BTreeMap::from([("app".to_string(), "pg".to_string())]),
            base_template: InstanceTemplateSpec {
                image: "postgres:16".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn factory_accepts_minimal_spec() {
        let set = InstanceSet::new("prod", "pg", labeled_spec()).unwrap();
        assert_eq!(set.spec.replicas, 1);
        assert_eq!(set.set_ref().to_string(), "prod/pg");
    }

    #[test]
    fn rejects_empty_selector() {
        let spec = InstanceSetSpec {
            selector_labels: BTreeMap::new(),
            ..labeled_spec()
        };
        assert_eq!(
            InstanceSet::new("prod", "pg", spec).unwrap_err(),
            SpecError::EmptySelector
        );
    }

    #[test]
    fn rejects_duplicate_roles() {
        let mut spec = labeled_spec();
        spec.roles = vec![
            RoleSpec {
                name: "primary".to_string(),
                access: AccessMode::ReadWrite,
                cardinality: RoleCardinality::ExactlyOne,
            },
            RoleSpec {
                name: "primary".to_string(),
                access: AccessMode::ReadOnly,
                cardinality: RoleCardinality::Any,
            },
        ];
        assert!(matches!(
            spec.validate("pg"),
            Err(SpecError::DuplicateRole(_))
        ));
    }

    #[test]
    fn rejects_two_exclusive_read_write_roles() {
        let mut spec = labeled_spec();
        spec.replicas = 4;
        spec.roles = vec![
            RoleSpec {
                name: "leader".to_string(),
                access: AccessMode::ReadWrite,
                cardinality: RoleCardinality::ExactlyOne,
            },
            RoleSpec {
                name: "coordinator".to_string(),
                access: AccessMode::ReadWrite,
                cardinality: RoleCardinality::ExactlyOne,
            },
        ];
        assert!(matches!(
            spec.validate("pg"),
            Err(SpecError::ConflictingExclusiveRoles { .. })
        ));
    }

    #[test]
    fn rejects_switchover_without_exclusive_role() {
        let mut spec = labeled_spec();
        spec.membership_reconfiguration = Some(MembershipReconfiguration {
            switchover: SwitchoverSpec {
                command: vec!["switchover".to_string()],
                timeout_secs: None,
            },
        });
        assert_eq!(
            spec.validate("pg"),
            Err(SpecError::SwitchoverWithoutExclusiveRole)
        );
    }

    #[test]
    fn rejects_over_subscribed_templates() {
        let mut spec = labeled_spec();
        spec.replicas = 2;
        spec.instance_templates = vec![
            InstanceTemplate {
                name: "a".to_string(),
                replicas: Some(2),
                ..Default::default()
            },
            InstanceTemplate {
                name: "b".to_string(),
                ..Default::default()
            },
        ];
        assert_eq!(
            spec.validate("pg"),
            Err(SpecError::OverSubscribed {
                claimed: 3,
                replicas: 2
            })
        );
    }

    #[test]
    fn rejects_ordinal_count_mismatch() {
        let mut spec = labeled_spec();
        spec.replicas = 3;
        spec.instance_templates = vec![InstanceTemplate {
            name: "a".to_string(),
            replicas: Some(3),
            ordinals: vec![0, 1],
            ..Default::default()
        }];
        assert!(matches!(
            spec.validate("pg"),
            Err(SpecError::OrdinalCountMismatch { .. })
        ));
    }

    #[test]
    fn rejects_foreign_offline_names() {
        let mut spec = labeled_spec();
        spec.offline_instances = BTreeSet::from(["mysql-0".to_string()]);
        assert!(matches!(
            spec.validate("pg"),
            Err(SpecError::BadOfflineName { .. })
        ));
    }

    #[test]
    fn override_rejects_unknown_fields() {
        let raw = r#"{"image":"postgres:17","nodeSelector":{"disk":"ssd"}}"#;
        let parsed: Result<TemplateOverride, _> = serde_json::from_str(raw);
        assert!(parsed.is_err());
    }

    #[test]
    fn concurrency_resolution() {
        assert_eq!(Concurrency::Count(3).resolve(10), 3);
        assert_eq!(Concurrency::Count(0).resolve(10), 1);
        assert_eq!(Concurrency::Percent(50).resolve(10), 5);
        assert_eq!(Concurrency::Percent(1).resolve(10), 1);
        assert_eq!(Concurrency::Percent(200).resolve(10), 10);
    }

    #[test]
    fn spec_defaults_from_empty_json() {
        let spec: InstanceSetSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.replicas, 1);
        assert_eq!(spec.pod_management_policy, PodManagementPolicy::OrderedReady);
        assert_eq!(
            spec.instance_update_strategy,
            InstanceUpdateStrategy::RollingUpdate { partition: 0 }
        );
        assert_eq!(
            spec.persistent_volume_claim_retention_policy.when_scaled,
            RetainPolicy::Retain
        );
    }
}
