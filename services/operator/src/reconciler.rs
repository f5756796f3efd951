//! The top-level reconcile pass.
//!
//! Level-triggered and idempotent: every pass re-derives what to do from
//! the spec plus observed state, executes a bounded action list through
//! the store boundary, and persists a freshly computed status. A pass
//! interrupted at any point is safe to re-run.
//!
//! Failure handling follows the error taxonomy: configuration conflicts
//! become a terminal condition (no actions, no retry until the spec
//! changes); transient store failures propagate so the worker can back
//! off; partial batch failures leave completed actions in place and the
//! next pass reconciles the remainder.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use iset_identity::{ClaimName, InstanceName, RequestId, SetRef};
use iset_reconcile::Revision;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::OperatorConfig;
use crate::instance::{Claim, Instance, InstancePhase};
use crate::ordinals;
use crate::retention::{self, ClaimDisposition, DeletionEvent};
use crate::roles::{RoleAssessment, RoleCoordinator};
use crate::spec::{InstanceSet, PodManagementPolicy, SpecError, VolumeClaimTemplate};
use crate::status::{ConditionKind, InstanceSetStatus, InstanceSummary, SwitchoverStatus};
use crate::store::{reasons, EventKind, EventSink, ObjectStore, StoreError, SwitchoverActuator};
use crate::template::{self, ResolvedInstance};
use crate::update::{self, PlannerInput, UpdateKind, UpdatePlan};

/// Errors escaping a reconcile pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Configuration conflict; normally absorbed into a status condition
    /// before it reaches the caller.
    #[error("configuration conflict: {0}")]
    Spec(#[from] SpecError),

    /// Store or actuator failure; transient ones are retried with
    /// backoff by the worker.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where the pass left the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Observed state matches the spec.
    Converged,

    /// Actions were issued (or remain); converging.
    Progressing,

    /// Progress is gated on a role transition.
    AwaitingRoleTransition,

    /// Actions suspended by `paused`; status still reported.
    Paused,

    /// Terminal configuration conflict reported on status.
    InvalidSpec,

    /// Cascading deletion still tearing down instances.
    Finalizing,

    /// The set object is gone.
    Deleted,
}

/// Per-pass accounting, logged by the worker.
#[derive(Debug, Clone, Copy)]
pub struct PassSummary {
    pub outcome: Outcome,
    pub created: u32,
    pub deleted: u32,
    pub patched: u32,
    pub switchovers_started: u32,
    pub claims_deleted: u32,
}

impl PassSummary {
    fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            created: 0,
            deleted: 0,
            patched: 0,
            switchovers_started: 0,
            claims_deleted: 0,
        }
    }

    /// Actions issued by this pass.
    pub fn action_count(&self) -> u32 {
        self.created + self.deleted + self.patched + self.claims_deleted
    }
}

/// Everything derivable from the spec alone, before any store call.
struct Prepared {
    desired: BTreeMap<InstanceName, ResolvedInstance>,
    creation_order: Vec<InstanceName>,
    claim_templates: BTreeMap<InstanceName, Vec<(ClaimName, VolumeClaimTemplate)>>,
    update_revision: Revision,
}

/// The InstanceSet reconciler.
pub struct Reconciler<S, A, E> {
    config: OperatorConfig,
    store: Arc<S>,
    actuator: Arc<A>,
    events: Arc<E>,
}

impl<S, A, E> Reconciler<S, A, E>
where
    S: ObjectStore,
    A: SwitchoverActuator,
    E: EventSink,
{
    pub fn new(config: OperatorConfig, store: Arc<S>, actuator: Arc<A>, events: Arc<E>) -> Self {
        Self {
            config,
            store,
            actuator,
            events,
        }
    }

    /// Run one pass for a single set.
    #[instrument(skip(self), fields(set = %set_ref))]
    pub async fn reconcile(&self, set_ref: &SetRef) -> Result<PassSummary, ReconcileError> {
        let request_id = RequestId::new();
        debug!(request = %request_id, "Starting pass");

        let set = self.store.get_set(set_ref).await?;
        let now = Utc::now();

        if set.meta.deletion_requested {
            return self.finalize(&set, now).await;
        }

        let prepared = match self.prepare(&set) {
            Ok(prepared) => prepared,
            Err(err) => return self.report_invalid_spec(&set, &err, now).await,
        };

        let observed = self.observe(&set).await?;
        let claims = self.store.list_claims(set_ref).await?;

        let coordinator = RoleCoordinator::new(&set.spec, self.config.switchover_timeout);
        let mut switchover_record = set.status.switchover.clone();
        let assessment =
            coordinator.assess(&set.meta.name, &observed, switchover_record.as_ref(), now);
        if let Some(done) = &assessment.completed {
            info!(instance = %done.instance, role = %done.role, "Switchover completed");
            self.events.record(
                set_ref,
                EventKind::Normal,
                reasons::SWITCHOVER_COMPLETED,
                &format!("role {} moved off {}", done.role, done.instance),
            );
            switchover_record = None;
        }

        let plan = update::plan(&PlannerInput {
            spec: &set.spec,
            desired: &prepared.desired,
            creation_order: &prepared.creation_order,
            observed: &observed,
            assessment: &assessment,
            now,
        });

        let mut summary = PassSummary::new(Outcome::Progressing);
        let mut first_error: Option<StoreError> = None;

        self.execute_creates(&set, &prepared, &plan, &claims, &mut summary, &mut first_error)
            .await;
        self.execute_updates(&set, &prepared, &plan, &observed, &mut summary, &mut first_error)
            .await;
        self.execute_deletes(&set, &plan, &observed, &claims, &mut summary, &mut first_error)
            .await;
        self.drive_switchover(
            &set,
            &prepared,
            &plan,
            &observed,
            &assessment,
            &coordinator,
            &mut switchover_record,
            &mut summary,
            now,
        )
        .await;

        // Recompute status from what the store holds after our actions.
        let observed_after = self.observe(&set).await?;
        let post = coordinator.assess(
            &set.meta.name,
            &observed_after,
            switchover_record.as_ref(),
            now,
        );
        let status = self.build_status(
            &set,
            &prepared,
            &observed_after,
            &post,
            &plan,
            switchover_record,
            now,
        );
        if status != set.status {
            self.store
                .update_status(set_ref, set.meta.resource_version, status)
                .await?;
        }

        if let Some(err) = first_error {
            return Err(err.into());
        }

        summary.outcome = self.outcome(&set, &prepared, &observed_after, &post, &plan, now);
        Ok(summary)
    }

    /// Validate, allocate, and resolve. Pure: no store calls.
    fn prepare(&self, set: &InstanceSet) -> Result<Prepared, SpecError> {
        set.spec.validate(&set.meta.name)?;

        let creation_order = ordinals::allocate(&set.meta.name, &set.spec)?;
        let mut desired = BTreeMap::new();
        let mut claim_templates = BTreeMap::new();
        for name in &creation_order {
            let resolved = template::resolve(&set.spec, name)?;
            let mut claims = Vec::new();
            for vct in &resolved.spec.volume_claim_templates {
                let claim_name = ClaimName::new(&vct.name, name.clone())?;
                claims.push((claim_name, vct.clone()));
            }
            claim_templates.insert(name.clone(), claims);
            desired.insert(name.clone(), resolved);
        }

        // Identity-independent target fingerprint: one entry per distinct
        // template among the desired instances.
        let mut per_template: BTreeMap<String, String> = BTreeMap::new();
        for resolved in desired.values() {
            let template_key = resolved.name.template().unwrap_or("").to_string();
            per_template.insert(template_key, resolved.revision.as_str().to_string());
        }
        let update_revision = Revision::of(&per_template)
            .map_err(|e| SpecError::Fingerprint(e.to_string()))?;

        Ok(Prepared {
            desired,
            creation_order,
            claim_templates,
            update_revision,
        })
    }

    async fn observe(
        &self,
        set: &InstanceSet,
    ) -> Result<BTreeMap<InstanceName, Instance>, StoreError> {
        let instances = self
            .store
            .list_instances(&set.set_ref(), &set.spec.selector_labels)
            .await?;
        Ok(instances
            .into_iter()
            .map(|i| (i.name.clone(), i))
            .collect())
    }

    async fn execute_creates(
        &self,
        set: &InstanceSet,
        prepared: &Prepared,
        plan: &UpdatePlan,
        claims: &[Claim],
        summary: &mut PassSummary,
        first_error: &mut Option<StoreError>,
    ) {
        let set_ref = set.set_ref();
        for name in &plan.creates {
            let resolved = &prepared.desired[name];
            if let Err(err) = self
                .ensure_claims(&set_ref, prepared, name, claims)
                .await
            {
                warn!(instance = %name, phase = "claims", error = %err, "Create failed");
                first_error.get_or_insert(err);
                continue;
            }

            let storage = prepared.claim_templates[name]
                .iter()
                .map(|(claim_name, _)| claim_name.clone())
                .collect();
            let record = new_instance_record(resolved, storage);
            match self.store.create_instance(&set_ref, record).await {
                Ok(()) => {
                    summary.created += 1;
                    self.events.record(
                        &set_ref,
                        EventKind::Normal,
                        reasons::INSTANCE_CREATED,
                        &name.to_string(),
                    );
                }
                Err(StoreError::AlreadyExists(_)) => {
                    debug!(instance = %name, "Instance already exists");
                }
                Err(err) => {
                    warn!(instance = %name, phase = "create", error = %err, "Create failed");
                    first_error.get_or_insert(err);
                }
            }
        }
    }

    /// Create any claims the instance needs that do not already exist;
    /// retained claims from a previous life are re-adopted untouched.
    async fn ensure_claims(
        &self,
        set_ref: &SetRef,
        prepared: &Prepared,
        name: &InstanceName,
        existing: &[Claim],
    ) -> Result<(), StoreError> {
        for (claim_name, vct) in &prepared.claim_templates[name] {
            if existing.iter().any(|c| &c.name == claim_name) {
                continue;
            }
            let claim = Claim {
                name: claim_name.clone(),
                storage_bytes: vct.storage_bytes,
                storage_class: vct.storage_class.clone(),
                resource_version: 0,
            };
            match self.store.create_claim(set_ref, claim).await {
                Ok(()) | Err(StoreError::AlreadyExists(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn execute_updates(
        &self,
        set: &InstanceSet,
        prepared: &Prepared,
        plan: &UpdatePlan,
        observed: &BTreeMap<InstanceName, Instance>,
        summary: &mut PassSummary,
        first_error: &mut Option<StoreError>,
    ) {
        let set_ref = set.set_ref();
        for action in &plan.updates {
            let Some(current) = observed.get(&action.name) else {
                continue;
            };
            let resolved = &prepared.desired[&action.name];
            let result = match action.kind {
                UpdateKind::InPlace => {
                    let storage = current.storage.clone();
                    let mut record = new_instance_record(resolved, storage);
                    record.phase = current.phase;
                    record.reported_role = current.reported_role.clone();
                    self.store
                        .patch_instance(
                            &set_ref,
                            &action.name,
                            current.resource_version,
                            record,
                        )
                        .await
                }
                UpdateKind::Recreate => {
                    // Delete now; the next pass sees the identity missing
                    // and recreates it at the target revision. Claims stay:
                    // the identity is still desired.
                    self.store
                        .delete_instance(&set_ref, &action.name, current.resource_version)
                        .await
                }
            };
            match result {
                Ok(()) => match action.kind {
                    UpdateKind::InPlace => {
                        summary.patched += 1;
                        self.events.record(
                            &set_ref,
                            EventKind::Normal,
                            reasons::INSTANCE_PATCHED,
                            &action.name.to_string(),
                        );
                    }
                    UpdateKind::Recreate => {
                        summary.deleted += 1;
                        self.events.record(
                            &set_ref,
                            EventKind::Normal,
                            reasons::INSTANCE_DELETED,
                            &format!("{} (replaced for update)", action.name),
                        );
                    }
                },
                Err(err) => {
                    warn!(instance = %action.name, phase = "update", error = %err, "Update failed");
                    first_error.get_or_insert(err);
                }
            }
        }
    }

    async fn execute_deletes(
        &self,
        set: &InstanceSet,
        plan: &UpdatePlan,
        observed: &BTreeMap<InstanceName, Instance>,
        claims: &[Claim],
        summary: &mut PassSummary,
        first_error: &mut Option<StoreError>,
    ) {
        let set_ref = set.set_ref();
        let policy = &set.spec.persistent_volume_claim_retention_policy;
        for name in &plan.deletes {
            let Some(current) = observed.get(name) else {
                continue;
            };
            match self
                .store
                .delete_instance(&set_ref, name, current.resource_version)
                .await
            {
                Ok(()) => {
                    summary.deleted += 1;
                    self.events.record(
                        &set_ref,
                        EventKind::Normal,
                        reasons::INSTANCE_DELETED,
                        &name.to_string(),
                    );
                }
                Err(err) => {
                    warn!(instance = %name, phase = "delete", error = %err, "Delete failed");
                    first_error.get_or_insert(err);
                    continue;
                }
            }

            if retention::decide(DeletionEvent::ScaleDown, policy) == ClaimDisposition::Delete {
                for claim_name in retention::claims_of(claims, name) {
                    match self.store.delete_claim(&set_ref, claim_name).await {
                        Ok(()) => {
                            summary.claims_deleted += 1;
                            self.events.record(
                                &set_ref,
                                EventKind::Normal,
                                reasons::CLAIM_DELETED,
                                &claim_name.to_string(),
                            );
                        }
                        Err(err) => {
                            warn!(claim = %claim_name, phase = "retention", error = %err, "Claim delete failed");
                            first_error.get_or_insert(err);
                        }
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive_switchover(
        &self,
        set: &InstanceSet,
        prepared: &Prepared,
        plan: &UpdatePlan,
        observed: &BTreeMap<InstanceName, Instance>,
        assessment: &RoleAssessment,
        coordinator: &RoleCoordinator<'_>,
        record: &mut Option<SwitchoverStatus>,
        summary: &mut PassSummary,
        now: DateTime<Utc>,
    ) {
        let set_ref = set.set_ref();

        if plan.awaiting_switchover.is_empty() {
            // Nothing wants a transition anymore; drop a leftover record.
            if assessment.pending.is_some() {
                debug!("Dropping switchover record with no remaining demand");
                *record = None;
            }
            return;
        }

        let Some(reconfiguration) = &set.spec.membership_reconfiguration else {
            self.events.record(
                &set_ref,
                EventKind::Warning,
                reasons::SWITCHOVER_UNCONFIGURED,
                "an exclusive role must move but no membership reconfiguration is configured",
            );
            return;
        };

        if assessment.pending.is_some() && !assessment.expired {
            // In flight and within its window; wait for the role report.
            return;
        }
        if assessment.expired {
            if let Some(pending) = &assessment.pending {
                warn!(instance = %pending.instance, role = %pending.role, "Switchover overdue; retrying");
                self.events.record(
                    &set_ref,
                    EventKind::Warning,
                    reasons::SWITCHOVER_OVERDUE,
                    &format!("role {} still on {}", pending.role, pending.instance),
                );
            }
        }

        // One transition at a time.
        let holder = &plan.awaiting_switchover[0];
        let Some(role) = assessment.barrier(holder).map(str::to_string) else {
            return;
        };
        let target = coordinator.select_target(observed, &prepared.desired, holder);
        match self
            .actuator
            .begin_switchover(
                &set_ref,
                holder,
                target.as_ref(),
                &reconfiguration.switchover,
            )
            .await
        {
            Ok(()) => {
                summary.switchovers_started += 1;
                info!(instance = %holder, role = %role, target = ?target.as_ref().map(|t| t.to_string()), "Switchover started");
                self.events.record(
                    &set_ref,
                    EventKind::Normal,
                    reasons::SWITCHOVER_STARTED,
                    &format!("moving role {role} off {holder}"),
                );
                *record = Some(SwitchoverStatus {
                    instance: holder.to_string(),
                    role,
                    started_at: now,
                });
            }
            Err(err) => {
                // Retried next pass; the holder stays protected meanwhile.
                warn!(instance = %holder, phase = "switchover", error = %err, "Switchover invocation failed");
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_status(
        &self,
        set: &InstanceSet,
        prepared: &Prepared,
        observed: &BTreeMap<InstanceName, Instance>,
        assessment: &RoleAssessment,
        plan: &UpdatePlan,
        switchover: Option<SwitchoverStatus>,
        now: DateTime<Utc>,
    ) -> InstanceSetStatus {
        let min_ready = std::time::Duration::from_secs(u64::from(set.spec.min_ready_seconds));
        let desired_count = prepared.desired.len() as u32;

        let replicas = observed.len() as u32;
        let ready_replicas = observed.values().filter(|i| i.ready).count() as u32;
        let available_replicas = observed
            .values()
            .filter(|i| i.available(min_ready, now))
            .count() as u32;
        let updated_replicas = observed
            .values()
            .filter(|i| {
                prepared
                    .desired
                    .get(&i.name)
                    .is_some_and(|d| d.revision == i.revision)
            })
            .count() as u32;

        let converged = plan.is_converged()
            && replicas == desired_count
            && available_replicas == desired_count;

        let mut status = InstanceSetStatus {
            observed_generation: set.meta.generation,
            replicas,
            ready_replicas,
            available_replicas,
            updated_replicas,
            current_revision: set.status.current_revision.clone(),
            update_revision: Some(prepared.update_revision.as_str().to_string()),
            role_members: assessment.counts.clone(),
            switchover,
            instances: observed
                .values()
                .map(|i| InstanceSummary {
                    name: i.name.to_string(),
                    revision: i.revision.as_str().to_string(),
                    role: i.reported_role.clone(),
                    ready: i.ready,
                })
                .collect(),
            conditions: set.status.conditions.clone(),
        };

        if converged && updated_replicas == desired_count {
            status.current_revision = status.update_revision.clone();
        }

        status.set_condition(
            ConditionKind::ConfigurationValid,
            true,
            "Validated",
            "",
            now,
        );

        let updating = !plan.is_converged() || updated_replicas != desired_count;
        status.set_condition(
            ConditionKind::Updating,
            updating,
            if updating { "Reconciling" } else { "Converged" },
            &format!("{updated_replicas}/{desired_count} instances at update revision"),
            now,
        );

        let transition_pending =
            status.switchover.is_some() || !plan.awaiting_switchover.is_empty();
        let transition_reason = if assessment.expired {
            "SwitchoverOverdue"
        } else if transition_pending && set.spec.membership_reconfiguration.is_none() {
            "SwitchoverUnconfigured"
        } else {
            "SwitchoverInProgress"
        };
        status.set_condition(
            ConditionKind::RoleTransitionPending,
            transition_pending,
            if transition_pending {
                transition_reason
            } else {
                "NoTransition"
            },
            "",
            now,
        );

        let roles_settled = assessment.unsettled_roles.is_empty();
        let ready = converged && roles_settled;
        let (reason, message) = if set.spec.paused {
            ("Paused", "reconciliation suspended".to_string())
        } else if !roles_settled {
            (
                "RolesUnsettled",
                format!("unsettled roles: {}", assessment.unsettled_roles.join(", ")),
            )
        } else if !ready {
            (
                "Reconciling",
                format!("{available_replicas}/{desired_count} instances available"),
            )
        } else {
            ("AllReady", format!("{desired_count} instances available"))
        };
        status.set_condition(ConditionKind::Ready, ready, reason, &message, now);

        status
    }

    fn outcome(
        &self,
        set: &InstanceSet,
        prepared: &Prepared,
        observed: &BTreeMap<InstanceName, Instance>,
        assessment: &RoleAssessment,
        plan: &UpdatePlan,
        now: DateTime<Utc>,
    ) -> Outcome {
        if set.spec.paused {
            return Outcome::Paused;
        }
        if !plan.awaiting_switchover.is_empty() || assessment.pending.is_some() {
            return Outcome::AwaitingRoleTransition;
        }
        let min_ready = std::time::Duration::from_secs(u64::from(set.spec.min_ready_seconds));
        let desired_count = prepared.desired.len();
        let available = observed
            .values()
            .filter(|i| i.available(min_ready, now))
            .count();
        // Role settlement is the workload's business; with no actions
        // left the engine is converged even while roles are unreported,
        // and the Ready condition carries the difference.
        if plan.is_converged() && observed.len() == desired_count && available == desired_count {
            Outcome::Converged
        } else {
            Outcome::Progressing
        }
    }

    /// Terminal configuration conflict: report and stop until the spec
    /// changes.
    async fn report_invalid_spec(
        &self,
        set: &InstanceSet,
        err: &SpecError,
        now: DateTime<Utc>,
    ) -> Result<PassSummary, ReconcileError> {
        let set_ref = set.set_ref();
        warn!(error = %err, "Spec rejected");
        self.events.record(
            &set_ref,
            EventKind::Warning,
            reasons::INVALID_SPEC,
            &err.to_string(),
        );

        let mut status = set.status.clone();
        status.observed_generation = set.meta.generation;
        status.set_condition(
            ConditionKind::ConfigurationValid,
            false,
            "InvalidSpec",
            &err.to_string(),
            now,
        );
        status.set_condition(ConditionKind::Ready, false, "InvalidSpec", "", now);
        if status != set.status {
            self.store
                .update_status(&set_ref, set.meta.resource_version, status)
                .await?;
        }

        Ok(PassSummary::new(Outcome::InvalidSpec))
    }

    /// Cascading deletion: tear down instances highest ordinal first,
    /// then dispose of claims per the deletion clause, then remove the
    /// set object.
    async fn finalize(
        &self,
        set: &InstanceSet,
        now: DateTime<Utc>,
    ) -> Result<PassSummary, ReconcileError> {
        let set_ref = set.set_ref();
        let observed = self.observe(set).await?;
        let mut summary = PassSummary::new(Outcome::Finalizing);

        if !observed.is_empty() {
            let bound = match set.spec.pod_management_policy {
                PodManagementPolicy::OrderedReady => 1,
                PodManagementPolicy::Parallel => set
                    .spec
                    .parallel_pod_management_concurrency
                    .map(|c| c.resolve(set.spec.replicas))
                    .unwrap_or_else(|| set.spec.replicas.max(1)),
            };
            let mut names: Vec<&InstanceName> = observed.keys().collect();
            names.sort_by(|a, b| b.cmp(a));
            for name in names.into_iter().take(bound as usize) {
                let current = &observed[name];
                match self
                    .store
                    .delete_instance(&set_ref, name, current.resource_version)
                    .await
                {
                    Ok(()) => {
                        summary.deleted += 1;
                        self.events.record(
                            &set_ref,
                            EventKind::Normal,
                            reasons::INSTANCE_DELETED,
                            &name.to_string(),
                        );
                    }
                    Err(err) => {
                        warn!(instance = %name, phase = "finalize", error = %err, "Delete failed");
                        return Err(err.into());
                    }
                }
            }

            let mut status = set.status.clone();
            status.observed_generation = set.meta.generation;
            status.replicas = (observed.len() - summary.deleted as usize) as u32;
            status.set_condition(ConditionKind::Ready, false, "Terminating", "", now);
            self.store
                .update_status(&set_ref, set.meta.resource_version, status)
                .await?;
            return Ok(summary);
        }

        let policy = &set.spec.persistent_volume_claim_retention_policy;
        if retention::decide(DeletionEvent::SetDeletion, policy) == ClaimDisposition::Delete {
            for claim in self.store.list_claims(&set_ref).await? {
                self.store.delete_claim(&set_ref, &claim.name).await?;
                summary.claims_deleted += 1;
                self.events.record(
                    &set_ref,
                    EventKind::Normal,
                    reasons::CLAIM_DELETED,
                    &claim.name.to_string(),
                );
            }
        }

        self.store
            .remove_set(&set_ref, set.meta.resource_version)
            .await?;
        info!("Set finalized");
        self.events
            .record(&set_ref, EventKind::Normal, reasons::SET_FINALIZED, "");
        summary.outcome = Outcome::Deleted;
        Ok(summary)
    }
}

/// Fresh instance record for a resolved identity.
fn new_instance_record(resolved: &ResolvedInstance, storage: Vec<ClaimName>) -> Instance {
    Instance {
        name: resolved.name.clone(),
        labels: resolved.spec.labels.clone(),
        spec: resolved.spec.clone(),
        revision: resolved.revision.clone(),
        placement: resolved.placement.clone(),
        phase: InstancePhase::Pending,
        ready: false,
        ready_since: None,
        reported_role: None,
        storage,
        resource_version: 0,
    }
}
