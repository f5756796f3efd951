//! Storage retention: what happens to an instance's claims when it goes.
//!
//! The decision is made exactly once per deletion event and is
//! idempotent: repeating it on a retained claim is a no-op, and deleting
//! an already-absent claim is treated as success by the executor layer.

use iset_identity::{ClaimName, InstanceName};

use crate::instance::Claim;
use crate::spec::{ClaimRetentionPolicy, RetainPolicy};

/// Why an instance's claims are being considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionEvent {
    /// The instance fell out of the desired set (scale-down or replaced
    /// identity).
    ScaleDown,

    /// The whole InstanceSet is being deleted.
    SetDeletion,
}

/// What to do with a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDisposition {
    /// Leave the claim addressable by identity for re-adoption.
    Retain,

    /// Remove the claim through the executor.
    Delete,
}

/// Consult the policy clause matching the deletion event.
pub fn decide(event: DeletionEvent, policy: &ClaimRetentionPolicy) -> ClaimDisposition {
    let clause = match event {
        DeletionEvent::ScaleDown => policy.when_scaled,
        DeletionEvent::SetDeletion => policy.when_deleted,
    };
    match clause {
        RetainPolicy::Retain => ClaimDisposition::Retain,
        RetainPolicy::Delete => ClaimDisposition::Delete,
    }
}

/// Claims owned by one instance, walked from the explicit ownership
/// records rather than a live object graph.
pub fn claims_of<'a>(
    claims: &'a [Claim],
    instance: &'a InstanceName,
) -> impl Iterator<Item = &'a ClaimName> {
    claims
        .iter()
        .filter(move |c| c.name.instance() == instance)
        .map(|c| &c.name)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::spec::RetainPolicy;

    #[rstest]
    #[case(DeletionEvent::ScaleDown, RetainPolicy::Retain, RetainPolicy::Delete, ClaimDisposition::Retain)]
    #[case(DeletionEvent::ScaleDown, RetainPolicy::Delete, RetainPolicy::Retain, ClaimDisposition::Delete)]
    #[case(DeletionEvent::SetDeletion, RetainPolicy::Retain, RetainPolicy::Delete, ClaimDisposition::Delete)]
    #[case(DeletionEvent::SetDeletion, RetainPolicy::Delete, RetainPolicy::Retain, ClaimDisposition::Retain)]
    fn each_event_consults_its_own_clause(
        #[case] event: DeletionEvent,
        #[case] when_scaled: RetainPolicy,
        #[case] when_deleted: RetainPolicy,
        #[case] expected: ClaimDisposition,
    ) {
        let policy = ClaimRetentionPolicy {
            when_scaled,
            when_deleted,
        };
        assert_eq!(decide(event, &policy), expected);
    }

    #[test]
    fn ownership_walk_filters_by_instance() {
        let zero = InstanceName::base("pg", 0).unwrap();
        let one = InstanceName::base("pg", 1).unwrap();
        let claims = vec![
            Claim {
                name: ClaimName::new("data", zero.clone()).unwrap(),
                storage_bytes: 1 << 30,
                storage_class: None,
                resource_version: 1,
            },
            Claim {
                name: ClaimName::new("wal", zero.clone()).unwrap(),
                storage_bytes: 1 << 30,
                storage_class: None,
                resource_version: 2,
            },
            Claim {
                name: ClaimName::new("data", one.clone()).unwrap(),
                storage_bytes: 1 << 30,
                storage_class: None,
                resource_version: 3,
            },
        ];

        let owned: Vec<String> = claims_of(&claims, &zero).map(|c| c.to_string()).collect();
        assert_eq!(owned, ["data-pg-0", "wal-pg-0"]);
    }
}
