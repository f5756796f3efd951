//! Shared fixture for reconciler integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use iset_identity::SetRef;
use iset_operator::config::OperatorConfig;
use iset_operator::memory::{MemoryStore, RecordingEventSink, RecordingSwitchover};
use iset_operator::reconciler::{Outcome, PassSummary, Reconciler};
use iset_operator::spec::{
    AccessMode, InstanceSet, InstanceSetSpec, InstanceTemplateSpec, MembershipReconfiguration,
    RoleCardinality, RoleSpec, SwitchoverSpec, VolumeClaimTemplate,
};

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub actuator: Arc<RecordingSwitchover>,
    pub events: Arc<RecordingEventSink>,
    pub reconciler: Reconciler<MemoryStore, RecordingSwitchover, RecordingEventSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OperatorConfig::default())
    }

    pub fn with_config(config: OperatorConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let actuator = Arc::new(RecordingSwitchover::new());
        let events = Arc::new(RecordingEventSink::new());
        let reconciler = Reconciler::new(
            config,
            Arc::clone(&store),
            Arc::clone(&actuator),
            Arc::clone(&events),
        );
        Self {
            store,
            actuator,
            events,
            reconciler,
        }
    }

    pub fn install(&self, set: InstanceSet) -> SetRef {
        let set_ref = set.set_ref();
        self.store.insert_set(set);
        set_ref
    }

    pub async fn reconcile(&self, set_ref: &SetRef) -> PassSummary {
        self.reconciler
            .reconcile(set_ref)
            .await
            .expect("reconcile pass failed")
    }

    /// Reconcile until converged, marking whatever got created ready
    /// between passes (standing in for the workload coming up).
    pub async fn settle(&self, set_ref: &SetRef, max_passes: u32) -> PassSummary {
        let mut last = self.reconcile(set_ref).await;
        for _ in 0..max_passes {
            if last.outcome == Outcome::Converged {
                return last;
            }
            self.store.mark_all_ready(set_ref);
            last = self.reconcile(set_ref).await;
        }
        panic!("set did not converge within {max_passes} passes: {last:?}");
    }
}

/// Minimal valid spec: one selector label, one image.
pub fn base_spec(replicas: u32) -> InstanceSetSpec {
    InstanceSetSpec {
        replicas,
        selector_labels: BTreeMap::from([("app".to_string(), "pg".to_string())]),
        base_template: InstanceTemplateSpec {
            image: "postgres:16".to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Base spec plus a volume claim template.
pub fn spec_with_storage(replicas: u32) -> InstanceSetSpec {
    let mut spec = base_spec(replicas);
    spec.base_template.volume_claim_templates = vec![VolumeClaimTemplate {
        name: "data".to_string(),
        storage_bytes: 10 << 30,
        storage_class: None,
    }];
    spec
}

/// Base spec plus an exactly-one `primary` role, an unbounded
/// `secondary` role, and a configured switchover action.
pub fn spec_with_roles(replicas: u32) -> InstanceSetSpec {
    let mut spec = base_spec(replicas);
    spec.roles = vec![
        RoleSpec {
            name: "primary".to_string(),
            access: AccessMode::ReadWrite,
            cardinality: RoleCardinality::ExactlyOne,
        },
        RoleSpec {
            name: "secondary".to_string(),
            access: AccessMode::ReadOnly,
            cardinality: RoleCardinality::Any,
        },
    ];
    spec.membership_reconfiguration = Some(MembershipReconfiguration {
        switchover: SwitchoverSpec {
            command: vec!["pg_ctl".to_string(), "promote".to_string()],
            timeout_secs: None,
        },
    });
    spec
}
