//! Role tracking and membership reconfiguration.
//!
//! Each member is `Unknown` until the workload first reports a role,
//! `Assigned` once it has, and `Transitioning` while a planned
//! switchover is in flight. The core guarantee lives here: the engine
//! never disrupts the holder of an exclusive role until a later pass has
//! observed the role move, or the bounded wait expires; an expired
//! wait keeps the holder protected while the switchover is retried.
//!
//! Transition bookkeeping is re-derived every pass from the instance
//! reports plus the switchover record persisted in status; nothing
//! depends on in-memory history.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use iset_identity::InstanceName;
use iset_reconcile::TransitionWindow;

use crate::instance::Instance;
use crate::spec::InstanceSetSpec;
use crate::status::SwitchoverStatus;
use crate::template::ResolvedInstance;

/// Observed role state of one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberState {
    /// No role report yet.
    Unknown,

    /// Workload reported this role.
    Assigned(String),

    /// A switchover away from `from` is in flight.
    Transitioning {
        from: String,
        since: DateTime<Utc>,
    },
}

/// A switchover the coordinator wants tracked (or found in flight).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSwitchover {
    pub instance: InstanceName,
    pub role: String,
    pub started_at: DateTime<Utc>,
}

/// One pass's role picture.
#[derive(Debug, Clone)]
pub struct RoleAssessment {
    pub members: BTreeMap<InstanceName, MemberState>,

    /// Reported holder count per role defined in the spec.
    pub counts: BTreeMap<String, u32>,

    /// Roles whose cardinality constraint is currently violated
    /// (`ExactlyOne` without exactly one holder, `AtMostOne` with more).
    pub unsettled_roles: Vec<String>,

    /// In-flight switchover, if any.
    pub pending: Option<PendingSwitchover>,

    /// The pending switchover has outlived its window.
    pub expired: bool,

    /// A recorded switchover that completed since the last pass.
    pub completed: Option<PendingSwitchover>,

    exclusive_roles: BTreeSet<String>,
}

impl RoleAssessment {
    /// The role barring disruption of this instance, if any. Disruptive
    /// actions on such an instance must wait for a completed switchover;
    /// in-place updates that keep the role are exempt.
    pub fn barrier(&self, name: &InstanceName) -> Option<&str> {
        match self.members.get(name) {
            Some(MemberState::Assigned(role)) if self.exclusive_roles.contains(role) => {
                Some(role)
            }
            Some(MemberState::Transitioning { from, .. }) => Some(from),
            _ => None,
        }
    }

    /// True when the instance holds (or is relinquishing) an exclusive
    /// role.
    pub fn holds_exclusive(&self, name: &InstanceName) -> bool {
        self.barrier(name).is_some()
    }
}

/// Per-pass coordinator over the spec's role definitions.
pub struct RoleCoordinator<'a> {
    spec: &'a InstanceSetSpec,
    timeout: Duration,
}

impl<'a> RoleCoordinator<'a> {
    /// Build a coordinator; the set's membership reconfiguration may
    /// override the operator-wide switchover timeout.
    pub fn new(spec: &'a InstanceSetSpec, default_timeout: Duration) -> Self {
        let timeout = spec
            .membership_reconfiguration
            .as_ref()
            .and_then(|m| m.switchover.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);
        Self { spec, timeout }
    }

    /// The bounded wait applied to in-flight switchovers.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Derive the role picture from instance reports and the recorded
    /// in-flight switchover.
    pub fn assess(
        &self,
        set_name: &str,
        observed: &BTreeMap<InstanceName, Instance>,
        recorded: Option<&SwitchoverStatus>,
        now: DateTime<Utc>,
    ) -> RoleAssessment {
        let exclusive_roles: BTreeSet<String> = self
            .spec
            .roles
            .iter()
            .filter(|r| r.exclusive())
            .map(|r| r.name.clone())
            .collect();

        let mut members: BTreeMap<InstanceName, MemberState> = observed
            .iter()
            .map(|(name, instance)| {
                let state = match &instance.reported_role {
                    Some(role) => MemberState::Assigned(role.clone()),
                    None => MemberState::Unknown,
                };
                (name.clone(), state)
            })
            .collect();

        let mut counts: BTreeMap<String, u32> = self
            .spec
            .roles
            .iter()
            .map(|r| (r.name.clone(), 0))
            .collect();
        for instance in observed.values() {
            if let Some(role) = &instance.reported_role {
                if let Some(count) = counts.get_mut(role) {
                    *count += 1;
                }
            }
        }

        let mut pending = None;
        let mut expired = false;
        let mut completed = None;
        if let Some(record) = recorded {
            match InstanceName::parse(set_name, &record.instance) {
                Ok(holder) => {
                    let entry = PendingSwitchover {
                        instance: holder.clone(),
                        role: record.role.clone(),
                        started_at: record.started_at,
                    };
                    let still_holding = observed
                        .get(&holder)
                        .is_some_and(|i| i.reported_role.as_deref() == Some(record.role.as_str()));
                    if still_holding {
                        members.insert(
                            holder,
                            MemberState::Transitioning {
                                from: record.role.clone(),
                                since: record.started_at,
                            },
                        );
                        expired =
                            TransitionWindow::new(record.started_at, self.timeout).expired(now);
                        pending = Some(entry);
                    } else {
                        // The role moved (or the holder is gone): the
                        // transition is complete.
                        completed = Some(entry);
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        instance = %record.instance,
                        "Dropping switchover record with unparseable identity"
                    );
                }
            }
        }

        let unsettled_roles = self
            .spec
            .roles
            .iter()
            .filter(|r| {
                let holders = counts.get(&r.name).copied().unwrap_or(0);
                match r.cardinality {
                    crate::spec::RoleCardinality::ExactlyOne => holders != 1,
                    crate::spec::RoleCardinality::AtMostOne => holders > 1,
                    crate::spec::RoleCardinality::Any => false,
                }
            })
            .map(|r| r.name.clone())
            .collect();

        RoleAssessment {
            members,
            counts,
            unsettled_roles,
            pending,
            expired,
            completed,
            exclusive_roles,
        }
    }

    /// Pick the member the exclusive role should move to: a ready peer,
    /// preferring instances already at the target revision, then higher
    /// ordinals.
    pub fn select_target(
        &self,
        observed: &BTreeMap<InstanceName, Instance>,
        desired: &BTreeMap<InstanceName, ResolvedInstance>,
        exclude: &InstanceName,
    ) -> Option<InstanceName> {
        let mut candidates: Vec<&Instance> = observed
            .values()
            .filter(|i| i.ready && &i.name != exclude && desired.contains_key(&i.name))
            .collect();
        candidates.sort_by_key(|i| {
            let at_target = desired
                .get(&i.name)
                .is_some_and(|d| d.revision == i.revision);
            (!at_target, std::cmp::Reverse(i.name.ordinal()))
        });
        candidates.first().map(|i| i.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::instance::InstancePhase;
    use crate::spec::{
        AccessMode, InstanceTemplateSpec, RoleCardinality, RoleSpec,
    };
    use iset_reconcile::Revision;

    fn spec_with_roles() -> InstanceSetSpec {
        InstanceSetSpec {
            replicas: 3,
            selector_labels: BTreeMap::from([("app".to_string(), "pg".to_string())]),
            base_template: InstanceTemplateSpec {
                image: "postgres:16".to_string(),
                ..Default::default()
            },
            roles: vec![
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
            ],
            ..Default::default()
        }
    }

    fn member(ordinal: u32, role: Option<&str>, revision: &str) -> (InstanceName, Instance) {
        let name = InstanceName::base("pg", ordinal).unwrap();
        let instance = Instance {
            name: name.clone(),
            labels: BTreeMap::new(),
            spec: InstanceTemplateSpec::default(),
            revision: Revision::from_stored(revision),
            placement: Revision::from_stored("p"),
            phase: InstancePhase::Running,
            ready: true,
            ready_since: Some(Utc::now()),
            reported_role: role.map(str::to_string),
            storage: Vec::new(),
            resource_version: 1,
        };
        (name, instance)
    }

    #[test]
    fn first_report_assigns_role() {
        let spec = spec_with_roles();
        let coordinator = RoleCoordinator::new(&spec, Duration::from_secs(60));
        let observed = BTreeMap::from([
            member(0, Some("primary"), "r1"),
            member(1, None, "r1"),
        ]);
        let assessment = coordinator.assess("pg", &observed, None, Utc::now());

        let zero = InstanceName::base("pg", 0).unwrap();
        let one = InstanceName::base("pg", 1).unwrap();
        assert_eq!(
            assessment.members[&zero],
            MemberState::Assigned("primary".to_string())
        );
        assert_eq!(assessment.members[&one], MemberState::Unknown);
        assert_eq!(assessment.counts["primary"], 1);
        assert!(assessment.holds_exclusive(&zero));
        assert!(!assessment.holds_exclusive(&one));
    }

    #[test]
    fn exactly_one_without_holder_is_unsettled() {
        let spec = spec_with_roles();
        let coordinator = RoleCoordinator::new(&spec, Duration::from_secs(60));
        let observed = BTreeMap::from([member(0, None, "r1")]);
        let assessment = coordinator.assess("pg", &observed, None, Utc::now());
        assert_eq!(assessment.unsettled_roles, vec!["primary".to_string()]);
    }

    #[test]
    fn recorded_switchover_keeps_holder_blocked_until_role_moves() {
        let spec = spec_with_roles();
        let coordinator = RoleCoordinator::new(&spec, Duration::from_secs(60));
        let now = Utc::now();
        let record = SwitchoverStatus {
            instance: "pg-0".to_string(),
            role: "primary".to_string(),
            started_at: now,
        };

        // Still holding: transitioning, pending, not expired.
        let observed = BTreeMap::from([
            member(0, Some("primary"), "r1"),
            member(1, Some("secondary"), "r1"),
        ]);
        let assessment = coordinator.assess("pg", &observed, Some(&record), now);
        let zero = InstanceName::base("pg", 0).unwrap();
        assert!(matches!(
            assessment.members[&zero],
            MemberState::Transitioning { .. }
        ));
        assert!(assessment.pending.is_some());
        assert!(!assessment.expired);
        assert!(assessment.holds_exclusive(&zero));

        // Role moved: completed, holder free.
        let observed = BTreeMap::from([
            member(0, Some("secondary"), "r1"),
            member(1, Some("primary"), "r1"),
        ]);
        let assessment = coordinator.assess("pg", &observed, Some(&record), now);
        assert!(assessment.pending.is_none());
        assert!(assessment.completed.is_some());
        assert!(!assessment.holds_exclusive(&zero));
    }

    #[test]
    fn switchover_past_its_window_is_expired_but_still_blocking() {
        let spec = spec_with_roles();
        let coordinator = RoleCoordinator::new(&spec, Duration::from_secs(60));
        let started = Utc::now() - chrono::Duration::seconds(120);
        let record = SwitchoverStatus {
            instance: "pg-0".to_string(),
            role: "primary".to_string(),
            started_at: started,
        };
        let observed = BTreeMap::from([member(0, Some("primary"), "r1")]);
        let assessment = coordinator.assess("pg", &observed, Some(&record), Utc::now());
        assert!(assessment.expired);
        assert!(assessment.holds_exclusive(&InstanceName::base("pg", 0).unwrap()));
    }

    #[test]
    fn per_set_timeout_override() {
        let mut spec = spec_with_roles();
        spec.membership_reconfiguration = Some(crate::spec::MembershipReconfiguration {
            switchover: crate::spec::SwitchoverSpec {
                command: vec!["promote".to_string()],
                timeout_secs: Some(5),
            },
        });
        let coordinator = RoleCoordinator::new(&spec, Duration::from_secs(60));
        assert_eq!(coordinator.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn target_prefers_updated_ready_peers() {
        let spec = spec_with_roles();
        let coordinator = RoleCoordinator::new(&spec, Duration::from_secs(60));
        let observed = BTreeMap::from([
            member(0, Some("primary"), "old"),
            member(1, Some("secondary"), "new"),
            member(2, Some("secondary"), "old"),
        ]);
        let desired: BTreeMap<InstanceName, ResolvedInstance> = observed
            .keys()
            .map(|name| {
                (
                    name.clone(),
                    ResolvedInstance {
                        name: name.clone(),
                        spec: InstanceTemplateSpec::default(),
                        revision: Revision::from_stored("new"),
                        placement: Revision::from_stored("p"),
                    },
                )
            })
            .collect();

        let exclude = InstanceName::base("pg", 0).unwrap();
        let target = coordinator.select_target(&observed, &desired, &exclude);
        assert_eq!(target, Some(InstanceName::base("pg", 1).unwrap()));
    }
}
