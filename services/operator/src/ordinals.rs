//! Ordinal allocation: which identities should exist.
//!
//! Allocation is deterministic and free of hidden state: re-running with
//! identical inputs yields an identical set. Offline identities are
//! skipped but their ordinals stay consumed, so re-enabling an offline
//! instance re-admits the same identity rather than the next free one.
//!
//! Ordering of the returned list is the creation order: instance
//! templates in declaration order, then the base template; within each,
//! ordinal ascending. Deletion walks the same list in reverse.

use std::collections::{BTreeMap, BTreeSet};

use iset_identity::InstanceName;

use crate::spec::{InstanceSetSpec, SpecError};

/// Compute the complete set of desired identities for a set.
///
/// Reports a configuration conflict when explicit per-ordinal claims
/// over-subscribe `replicas` or, in flat mode, overlap across templates;
/// it never silently truncates.
pub fn allocate(set_name: &str, spec: &InstanceSetSpec) -> Result<Vec<InstanceName>, SpecError> {
    let offline = parse_offline(set_name, spec)?;

    if spec.flat_instance_ordinal {
        allocate_flat(set_name, spec, &offline)
    } else {
        allocate_per_template(set_name, spec, &offline)
    }
}

fn parse_offline(
    set_name: &str,
    spec: &InstanceSetSpec,
) -> Result<BTreeSet<InstanceName>, SpecError> {
    spec.offline_instances
        .iter()
        .map(|name| {
            InstanceName::parse(set_name, name)
                .map_err(|_| SpecError::BadOfflineName { name: name.clone() })
        })
        .collect()
}

/// Claimed instance count of the base template.
fn base_count(spec: &InstanceSetSpec) -> Result<u32, SpecError> {
    let claimed: u32 = spec.instance_templates.iter().map(|t| t.claim_count()).sum();
    if claimed > spec.replicas {
        return Err(SpecError::OverSubscribed {
            claimed,
            replicas: spec.replicas,
        });
    }
    Ok(spec.replicas - claimed)
}

/// Each template draws from its own contiguous sequence starting at zero.
fn allocate_per_template(
    set_name: &str,
    spec: &InstanceSetSpec,
    offline: &BTreeSet<InstanceName>,
) -> Result<Vec<InstanceName>, SpecError> {
    let base = base_count(spec)?;
    let mut desired = Vec::with_capacity(spec.replicas as usize);

    for template in &spec.instance_templates {
        if template.ordinals.is_empty() {
            let mut cursor = 0u32;
            let make = |ordinal| InstanceName::templated(set_name, &template.name, ordinal);
            take_sequential(template.claim_count(), &mut cursor, offline, make, &mut desired)?;
        } else {
            let mut ordinals = template.ordinals.clone();
            ordinals.sort_unstable();
            for ordinal in ordinals {
                let name = InstanceName::templated(set_name, &template.name, ordinal)?;
                // An explicitly pinned offline identity has no replacement.
                if !offline.contains(&name) {
                    desired.push(name);
                }
            }
        }
    }

    let mut cursor = 0u32;
    take_sequential(
        base,
        &mut cursor,
        offline,
        |ordinal| InstanceName::base(set_name, ordinal),
        &mut desired,
    )?;

    Ok(desired)
}

/// All templates share one contiguous ordinal sequence, assigned in
/// template declaration order with the base template last.
fn allocate_flat(
    set_name: &str,
    spec: &InstanceSetSpec,
    offline: &BTreeSet<InstanceName>,
) -> Result<Vec<InstanceName>, SpecError> {
    let base = base_count(spec)?;

    // Explicit claims consume their ordinals first; overlap is a conflict.
    let mut owner: BTreeMap<u32, &str> = BTreeMap::new();
    for template in &spec.instance_templates {
        for &ordinal in &template.ordinals {
            if let Some(first) = owner.insert(ordinal, &template.name) {
                return Err(SpecError::OrdinalConflict {
                    ordinal,
                    first: first.to_string(),
                    second: template.name.clone(),
                });
            }
        }
    }

    let mut used: BTreeSet<u32> = owner.keys().copied().collect();
    let mut cursor = 0u32;
    let mut desired = Vec::with_capacity(spec.replicas as usize);

    for template in &spec.instance_templates {
        if template.ordinals.is_empty() {
            let mut taken = 0;
            while taken < template.claim_count() {
                while used.contains(&cursor) {
                    cursor += 1;
                }
                let name = InstanceName::templated(set_name, &template.name, cursor)?;
                used.insert(cursor);
                cursor += 1;
                if offline.contains(&name) {
                    continue;
                }
                desired.push(name);
                taken += 1;
            }
        } else {
            let mut ordinals = template.ordinals.clone();
            ordinals.sort_unstable();
            for ordinal in ordinals {
                let name = InstanceName::templated(set_name, &template.name, ordinal)?;
                if !offline.contains(&name) {
                    desired.push(name);
                }
            }
        }
    }

    let mut taken = 0;
    while taken < base {
        while used.contains(&cursor) {
            cursor += 1;
        }
        let name = InstanceName::base(set_name, cursor)?;
        used.insert(cursor);
        cursor += 1;
        if offline.contains(&name) {
            continue;
        }
        desired.push(name);
        taken += 1;
    }

    Ok(desired)
}

/// Take `count` identities from a sequence, skipping offline names while
/// keeping their ordinals consumed.
fn take_sequential<F>(
    count: u32,
    cursor: &mut u32,
    offline: &BTreeSet<InstanceName>,
    make: F,
    out: &mut Vec<InstanceName>,
) -> Result<(), SpecError>
where
    F: Fn(u32) -> Result<InstanceName, iset_identity::IdError>,
{
    let mut taken = 0;
    while taken < count {
        let name = make(*cursor)?;
        *cursor += 1;
        if offline.contains(&name) {
            continue;
        }
        out.push(name);
        taken += 1;
    }
    Ok(())
}
