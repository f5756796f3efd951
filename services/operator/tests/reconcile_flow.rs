//! Integration tests for the core reconcile flow: identity allocation,
//! bounded creation and deletion, offline instances, configuration
//! conflicts, pausing, retention, and cascading deletion.

mod harness;

use std::collections::BTreeSet;

use harness::{base_spec, spec_with_storage, Harness};
use iset_operator::reconciler::Outcome;
use iset_operator::spec::{
    Concurrency, InstanceSet, InstanceTemplate, PodManagementPolicy, RetainPolicy,
    TemplateOverride,
};
use iset_operator::status::ConditionKind;
use rstest::rstest;

#[tokio::test]
async fn ordered_creation_proceeds_one_ordinal_at_a_time() {
    let h = Harness::new();
    let set_ref = h.install(InstanceSet::new("prod", "pg", base_spec(3)).unwrap());

    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.created, 1);
    assert_eq!(h.store.instance_names(&set_ref), ["pg-0"]);

    // The successor waits for pg-0 to become available.
    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.created, 0);

    h.store.mark_all_ready(&set_ref);
    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.created, 1);
    assert_eq!(h.store.instance_names(&set_ref), ["pg-0", "pg-1"]);

    h.store.mark_all_ready(&set_ref);
    h.reconcile(&set_ref).await;
    assert_eq!(h.store.instance_names(&set_ref), ["pg-0", "pg-1", "pg-2"]);

    h.store.mark_all_ready(&set_ref);
    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.outcome, Outcome::Converged);

    let status = h.store.status_of(&set_ref).unwrap();
    assert_eq!(status.replicas, 3);
    assert_eq!(status.ready_replicas, 3);
    assert!(status.is(ConditionKind::Ready));
    assert_eq!(status.current_revision, status.update_revision);
}

#[tokio::test]
async fn parallel_creation_is_bounded_by_concurrency() {
    let h = Harness::new();
    let mut spec = base_spec(3);
    spec.pod_management_policy = PodManagementPolicy::Parallel;
    spec.parallel_pod_management_concurrency = Some(Concurrency::Count(2));
    let set_ref = h.install(InstanceSet::new("prod", "pg", spec).unwrap());

    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.created, 2);

    h.store.mark_all_ready(&set_ref);
    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.created, 1);
    assert_eq!(h.store.instance_names(&set_ref), ["pg-0", "pg-1", "pg-2"]);
}

#[tokio::test]
async fn offline_instance_is_skipped_then_readmitted() {
    let h = Harness::new();
    let mut spec = base_spec(3);
    spec.pod_management_policy = PodManagementPolicy::Parallel;
    spec.offline_instances = BTreeSet::from(["pg-1".to_string()]);
    let set_ref = h.install(InstanceSet::new("prod", "pg", spec).unwrap());

    h.settle(&set_ref, 5).await;
    assert_eq!(h.store.instance_names(&set_ref), ["pg-0", "pg-2", "pg-3"]);

    // Re-enabling the identity re-admits pg-1 and retires pg-3.
    h.store
        .update_spec(&set_ref, |spec| spec.offline_instances.clear());
    h.settle(&set_ref, 5).await;
    assert_eq!(h.store.instance_names(&set_ref), ["pg-0", "pg-1", "pg-2"]);
}

#[tokio::test]
async fn overlapping_explicit_ordinals_are_terminal() {
    let h = Harness::new();
    let mut spec = base_spec(2);
    spec.flat_instance_ordinal = true;
    spec.instance_templates = vec![
        InstanceTemplate {
            name: "a".to_string(),
            ordinals: vec![0],
            ..Default::default()
        },
        InstanceTemplate {
            name: "b".to_string(),
            ordinals: vec![0],
            ..Default::default()
        },
    ];
    // The factory would reject this spec; install it raw, as a stored
    // object edited behind the operator's back would look.
    let mut set = InstanceSet::new("prod", "pg", base_spec(2)).unwrap();
    set.spec = spec;
    let set_ref = h.install(set);

    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.outcome, Outcome::InvalidSpec);
    assert_eq!(pass.action_count(), 0);
    assert!(h.store.instance_names(&set_ref).is_empty());

    let status = h.store.status_of(&set_ref).unwrap();
    assert!(!status.is(ConditionKind::ConfigurationValid));
    assert!(h.events.reasons().contains(&"InvalidSpec".to_string()));

    // A corrected spec resumes reconciliation.
    h.store
        .update_spec(&set_ref, |spec| spec.instance_templates.clear());
    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.created, 1);
    assert!(h
        .store
        .status_of(&set_ref)
        .unwrap()
        .is(ConditionKind::ConfigurationValid));
}

#[tokio::test]
async fn converged_set_plans_nothing() {
    let h = Harness::new();
    let set_ref = h.install(InstanceSet::new("prod", "pg", base_spec(2)).unwrap());
    h.settle(&set_ref, 6).await;

    // No spec change, no drift: a further pass is a no-op.
    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.outcome, Outcome::Converged);
    assert_eq!(pass.action_count(), 0);
    assert!(h.actuator.calls().is_empty());
}

#[tokio::test]
async fn paused_set_reports_status_but_acts_on_nothing() {
    let h = Harness::new();
    let mut spec = base_spec(2);
    spec.paused = true;
    let set_ref = h.install(InstanceSet::new("prod", "pg", spec).unwrap());

    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.outcome, Outcome::Paused);
    assert_eq!(pass.action_count(), 0);
    assert!(h.store.instance_names(&set_ref).is_empty());
    // Status reporting continues while paused.
    let status = h.store.status_of(&set_ref).unwrap();
    assert_eq!(status.replicas, 0);
    assert!(!status.is(ConditionKind::Ready));

    h.store.update_spec(&set_ref, |spec| spec.paused = false);
    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.created, 1);
}

#[tokio::test]
async fn per_instance_template_overrides_apply() {
    let h = Harness::new();
    let mut spec = base_spec(3);
    spec.pod_management_policy = PodManagementPolicy::Parallel;
    spec.instance_templates = vec![InstanceTemplate {
        name: "analytics".to_string(),
        replicas: Some(1),
        overrides: TemplateOverride {
            image: Some("postgres:16-analytics".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }];
    let set = InstanceSet::new("prod", "pg", spec).unwrap();
    let selector = set.spec.selector_labels.clone();
    let set_ref = h.install(set);

    h.settle(&set_ref, 5).await;
    assert_eq!(
        h.store.instance_names(&set_ref),
        ["pg-0", "pg-1", "pg-analytics-0"]
    );

    use iset_operator::store::ObjectStore;
    let instances = h.store.list_instances(&set_ref, &selector).await.unwrap();
    let analytics = instances
        .iter()
        .find(|i| i.name.template() == Some("analytics"))
        .unwrap();
    let base = instances
        .iter()
        .find(|i| i.name.template().is_none())
        .unwrap();
    assert_eq!(analytics.spec.image, "postgres:16-analytics");
    assert_eq!(base.spec.image, "postgres:16");
    assert_ne!(analytics.revision, base.revision);
}

#[rstest]
#[case(RetainPolicy::Retain)]
#[case(RetainPolicy::Delete)]
#[tokio::test]
async fn scale_down_honors_the_retention_clause(#[case] when_scaled: RetainPolicy) {
    let h = Harness::new();
    let mut spec = spec_with_storage(2);
    spec.persistent_volume_claim_retention_policy.when_scaled = when_scaled;
    let set_ref = h.install(InstanceSet::new("prod", "pg", spec).unwrap());

    h.settle(&set_ref, 6).await;
    assert_eq!(h.store.claim_names(&set_ref), ["data-pg-0", "data-pg-1"]);

    h.store.update_spec(&set_ref, |spec| spec.replicas = 1);
    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.deleted, 1);

    match when_scaled {
        RetainPolicy::Retain => {
            assert_eq!(pass.claims_deleted, 0);
            assert_eq!(h.store.claim_names(&set_ref), ["data-pg-0", "data-pg-1"]);
        }
        RetainPolicy::Delete => {
            assert_eq!(pass.claims_deleted, 1);
            assert_eq!(h.store.claim_names(&set_ref), ["data-pg-0"]);
        }
    }
}

#[tokio::test]
async fn retained_claim_is_readopted_on_scale_up() {
    let h = Harness::new();
    let set_ref = h.install(InstanceSet::new("prod", "pg", spec_with_storage(2)).unwrap());
    h.settle(&set_ref, 6).await;
    let original_version = h.store.claim_version(&set_ref, "data-pg-1").unwrap();

    h.store.update_spec(&set_ref, |spec| spec.replicas = 1);
    h.settle(&set_ref, 4).await;
    // Default policy retains the claim.
    assert!(h.store.claim_version(&set_ref, "data-pg-1").is_some());

    h.store.update_spec(&set_ref, |spec| spec.replicas = 2);
    h.settle(&set_ref, 4).await;
    // The recreated pg-1 re-adopted its claim; no new claim was made.
    assert_eq!(
        h.store.claim_version(&set_ref, "data-pg-1").unwrap(),
        original_version
    );
}

#[rstest]
#[case(RetainPolicy::Retain)]
#[case(RetainPolicy::Delete)]
#[tokio::test]
async fn set_deletion_cascades_and_honors_the_deletion_clause(#[case] when_deleted: RetainPolicy) {
    let h = Harness::new();
    let mut spec = spec_with_storage(2);
    spec.persistent_volume_claim_retention_policy.when_deleted = when_deleted;
    let set_ref = h.install(InstanceSet::new("prod", "pg", spec).unwrap());
    h.settle(&set_ref, 6).await;

    h.store.request_deletion(&set_ref);

    // OrderedReady tears down one instance per pass, descending.
    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.outcome, Outcome::Finalizing);
    assert_eq!(h.store.instance_names(&set_ref), ["pg-0"]);

    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.outcome, Outcome::Finalizing);
    assert!(h.store.instance_names(&set_ref).is_empty());

    let pass = h.reconcile(&set_ref).await;
    assert_eq!(pass.outcome, Outcome::Deleted);
    assert!(!h.store.set_exists(&set_ref));
    match when_deleted {
        RetainPolicy::Retain => {
            // Retained claims stay addressable for a future re-adoption.
            assert_eq!(h.store.claim_names(&set_ref), ["data-pg-0", "data-pg-1"]);
        }
        RetainPolicy::Delete => {
            assert!(h.store.claim_names(&set_ref).is_empty());
        }
    }
}
