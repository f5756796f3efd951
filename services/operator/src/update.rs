//! Update orchestration: bounded, ordered action planning.
//!
//! Planning is pure: given the desired identity map, the observed
//! instances, and the pass's role assessment, produce the create, delete,
//! and update actions this pass may perform without exceeding the
//! concurrency bound or violating role ordering. Execution (and its
//! failures) belong to the reconciler; replanning next pass picks up any
//! remainder.
//!
//! A replacement update is issued as a delete; the next pass observes the
//! identity missing and recreates it at the target revision. This keeps
//! every step re-derivable from live state after a crash.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use iset_identity::InstanceName;

use crate::instance::{Instance, InstancePhase};
use crate::roles::RoleAssessment;
use crate::spec::{
    InstanceSetSpec, InstanceUpdatePolicy, InstanceUpdateStrategy, MemberUpdateStrategy,
    PodManagementPolicy,
};
use crate::template::ResolvedInstance;

/// How a stale instance is brought to the target revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Patch the running instance; keeps identity and roles.
    InPlace,

    /// Delete now, recreate (next pass) at the target revision.
    Recreate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateAction {
    pub name: InstanceName,
    pub kind: UpdateKind,
}

/// The bounded action list for one pass.
#[derive(Debug, Clone, Default)]
pub struct UpdatePlan {
    /// Identities to create, in order.
    pub creates: Vec<InstanceName>,

    /// Instances to delete (scale-down / no longer desired), highest
    /// ordinal first.
    pub deletes: Vec<InstanceName>,

    /// Stale instances to update this pass.
    pub updates: Vec<UpdateAction>,

    /// Disruption wanted now but barred by an exclusive role; the
    /// reconciler must drive a switchover first.
    pub awaiting_switchover: Vec<InstanceName>,

    /// Work held back by the budget, ordering gates, or the partition.
    pub deferred: Vec<InstanceName>,
}

impl UpdatePlan {
    /// No actions and no pending work: the set has converged.
    pub fn is_converged(&self) -> bool {
        self.creates.is_empty()
            && self.deletes.is_empty()
            && self.updates.is_empty()
            && self.awaiting_switchover.is_empty()
            && self.deferred.is_empty()
    }

    /// Actions this pass will execute.
    pub fn action_count(&self) -> usize {
        self.creates.len() + self.deletes.len() + self.updates.len()
    }
}

/// Inputs to one planning round.
pub struct PlannerInput<'a> {
    pub spec: &'a InstanceSetSpec,
    pub desired: &'a BTreeMap<InstanceName, ResolvedInstance>,

    /// Allocation order; creation walks it forward, deletion backward.
    pub creation_order: &'a [InstanceName],

    pub observed: &'a BTreeMap<InstanceName, Instance>,
    pub assessment: &'a RoleAssessment,
    pub now: DateTime<Utc>,
}

/// Produce the bounded, ordered action list for one pass.
pub fn plan(input: &PlannerInput<'_>) -> UpdatePlan {
    let mut plan = UpdatePlan::default();
    if input.spec.paused {
        return plan;
    }

    let min_ready = Duration::from_secs(u64::from(input.spec.min_ready_seconds));
    let ordered = input.spec.pod_management_policy == PodManagementPolicy::OrderedReady;

    let bound = if ordered {
        1
    } else {
        input
            .spec
            .parallel_pod_management_concurrency
            .map(|c| c.resolve(input.spec.replicas))
            .unwrap_or_else(|| input.spec.replicas.max(1))
    };

    // Instances still converging hold a slot of the disruption budget.
    let in_flight = input
        .observed
        .values()
        .filter(|i| input.desired.contains_key(&i.name))
        .filter(|i| i.phase != InstancePhase::Failed)
        .filter(|i| !i.available(min_ready, input.now))
        .count() as u32;
    let mut budget = bound.saturating_sub(in_flight);

    let missing: Vec<&InstanceName> = input
        .creation_order
        .iter()
        .filter(|name| !input.observed.contains_key(*name))
        .collect();

    let mut extra: Vec<&InstanceName> = input
        .observed
        .keys()
        .filter(|name| !input.desired.contains_key(*name))
        .collect();
    // Deletion proceeds ordinal-descending.
    extra.sort_by(|a, b| b.cmp(a));

    plan_creates(input, &missing, ordered, min_ready, &mut budget, &mut plan);
    plan_deletes(input, &extra, &mut budget, &mut plan);
    plan_updates(input, &missing, min_ready, &mut budget, &mut plan);

    plan
}

fn plan_creates(
    input: &PlannerInput<'_>,
    missing: &[&InstanceName],
    ordered: bool,
    min_ready: Duration,
    budget: &mut u32,
    plan: &mut UpdatePlan,
) {
    if ordered {
        // Serial creation: only the first missing identity, and only once
        // every predecessor is up and available.
        let Some(first) = missing.first() else {
            return;
        };
        let predecessors_settled = input
            .creation_order
            .iter()
            .take_while(|name| name != first)
            .all(|name| {
                input
                    .observed
                    .get(name)
                    .is_some_and(|i| i.available(min_ready, input.now))
            });
        if predecessors_settled && *budget > 0 {
            plan.creates.push((*first).clone());
            *budget -= 1;
        }
        for name in missing.iter().skip(plan.creates.len()) {
            plan.deferred.push((*name).clone());
        }
    } else {
        for name in missing {
            if *budget > 0 {
                plan.creates.push((*name).clone());
                *budget -= 1;
            } else {
                plan.deferred.push((*name).clone());
            }
        }
    }
}

fn plan_deletes(
    input: &PlannerInput<'_>,
    extra: &[&InstanceName],
    budget: &mut u32,
    plan: &mut UpdatePlan,
) {
    for name in extra {
        // Scale-down of an exclusive-role holder must switch the role
        // away first.
        if input.assessment.barrier(name).is_some() {
            plan.awaiting_switchover.push((*name).clone());
            continue;
        }
        if *budget > 0 {
            plan.deletes.push((*name).clone());
            *budget -= 1;
        } else {
            plan.deferred.push((*name).clone());
        }
    }
}

fn plan_updates(
    input: &PlannerInput<'_>,
    missing: &[&InstanceName],
    min_ready: Duration,
    budget: &mut u32,
    plan: &mut UpdatePlan,
) {
    let partition = match input.spec.instance_update_strategy {
        InstanceUpdateStrategy::RollingUpdate { partition } => partition,
        InstanceUpdateStrategy::OnDelete => {
            // Stale instances are replaced only when the caller deletes
            // them; nothing to plan, nothing pending.
            return;
        }
    };

    let mut stale: Vec<&InstanceName> = input
        .observed
        .values()
        .filter(|i| {
            input
                .desired
                .get(&i.name)
                .is_some_and(|d| d.revision != i.revision)
        })
        .filter(|i| i.phase != InstancePhase::Terminating)
        .map(|i| &i.name)
        .collect();
    if stale.is_empty() {
        return;
    }

    // Non-exclusive members first; within a class, ordinal ascending.
    stale.sort_by_key(|name| (input.assessment.holds_exclusive(name), (*name).clone()));

    let settled = missing.is_empty()
        && input
            .observed
            .values()
            .filter(|i| input.desired.contains_key(&i.name))
            .all(|i| i.available(min_ready, input.now));

    let non_exclusive_stale = stale
        .iter()
        .filter(|name| !input.assessment.holds_exclusive(name))
        .count();

    let cap = match input.spec.member_update_strategy {
        MemberUpdateStrategy::Serial => 1,
        MemberUpdateStrategy::BestEffortParallel | MemberUpdateStrategy::Parallel => u32::MAX,
    };

    let mut taken = 0u32;
    for name in stale {
        let held_by_partition = name.ordinal() < partition;
        if held_by_partition {
            plan.deferred.push(name.clone());
            continue;
        }

        let exclusive = input.assessment.holds_exclusive(name);
        let eligible = match input.spec.member_update_strategy {
            MemberUpdateStrategy::Serial => settled && (!exclusive || non_exclusive_stale == 0),
            MemberUpdateStrategy::BestEffortParallel => {
                !exclusive || (non_exclusive_stale == 0 && settled)
            }
            MemberUpdateStrategy::Parallel => true,
        };
        if !eligible {
            plan.deferred.push(name.clone());
            continue;
        }

        let kind = update_kind(input, name);
        if exclusive && kind == UpdateKind::Recreate {
            // Disruptive action on the holder: switchover first.
            plan.awaiting_switchover.push(name.clone());
            continue;
        }

        if taken < cap && *budget > 0 {
            plan.updates.push(UpdateAction {
                name: name.clone(),
                kind,
            });
            taken += 1;
            *budget -= 1;
        } else {
            plan.deferred.push(name.clone());
        }
    }
}

fn update_kind(input: &PlannerInput<'_>, name: &InstanceName) -> UpdateKind {
    if input.spec.instance_update_policy == InstanceUpdatePolicy::Recreate {
        return UpdateKind::Recreate;
    }
    let in_place_safe = match (input.observed.get(name), input.desired.get(name)) {
        (Some(observed), Some(desired)) => observed.placement == desired.placement,
        _ => false,
    };
    if in_place_safe {
        UpdateKind::InPlace
    } else {
        UpdateKind::Recreate
    }
}
