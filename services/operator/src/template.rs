//! Template resolution: one concrete spec per identity.
//!
//! Resolution merges the matching instance template's override onto the
//! base template (strict field-level merge; list fields replace
//! wholesale, labels/annotations merge additively), substitutes
//! `$(VAR)` template variables into string fields, and fingerprints the
//! result. The revision is change detection only, never ordering or
//! identity.

use std::collections::BTreeMap;

use iset_identity::InstanceName;
use iset_reconcile::Revision;
use serde::Serialize;

use crate::spec::{
    InstanceSetSpec, InstanceTemplateSpec, Resources, SpecError, TemplateOverride,
    VolumeClaimTemplate,
};

/// A fully concrete instance specification plus its fingerprints.
#[derive(Debug, Clone)]
pub struct ResolvedInstance {
    pub name: InstanceName,
    pub spec: InstanceTemplateSpec,

    /// Fingerprint of the whole resolved spec.
    pub revision: Revision,

    /// Fingerprint of the replacement-requiring subset (storage and
    /// resource shape); equal placements allow in-place updates.
    pub placement: Revision,
}

/// The replacement-requiring subset of a spec, hashed separately.
#[derive(Serialize)]
struct PlacementShape<'a> {
    resources: &'a Resources,
    volume_claim_templates: &'a [VolumeClaimTemplate],
}

/// Resolve the concrete specification for one identity.
pub fn resolve(
    spec: &InstanceSetSpec,
    name: &InstanceName,
) -> Result<ResolvedInstance, SpecError> {
    let mut resolved = match name.template() {
        Some(template_name) => {
            let mut matches = spec
                .instance_templates
                .iter()
                .filter(|t| t.name == template_name);
            let template = matches.next().ok_or_else(|| SpecError::UnknownTemplate {
                identity: name.to_string(),
            })?;
            if matches.next().is_some() {
                return Err(SpecError::AmbiguousTemplate {
                    identity: name.to_string(),
                });
            }
            merge(&spec.base_template, &template.overrides)
        }
        None => spec.base_template.clone(),
    };

    substitute_spec(&mut resolved, &spec.template_vars);

    // Instances must always match the set's selector.
    for (key, value) in &spec.selector_labels {
        resolved.labels.insert(key.clone(), value.clone());
    }

    let revision =
        Revision::of(&resolved).map_err(|e| SpecError::Fingerprint(e.to_string()))?;
    let placement = Revision::of(&PlacementShape {
        resources: &resolved.resources,
        volume_claim_templates: &resolved.volume_claim_templates,
    })
    .map_err(|e| SpecError::Fingerprint(e.to_string()))?;

    Ok(ResolvedInstance {
        name: name.clone(),
        spec: resolved,
        revision,
        placement,
    })
}

/// Strict field-level merge: override wins field-by-field; list fields
/// replace wholesale; labels and annotations merge additively with the
/// override winning per key.
fn merge(base: &InstanceTemplateSpec, ov: &TemplateOverride) -> InstanceTemplateSpec {
    let mut labels = base.labels.clone();
    labels.extend(ov.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    let mut annotations = base.annotations.clone();
    annotations.extend(ov.annotations.iter().map(|(k, v)| (k.clone(), v.clone())));

    InstanceTemplateSpec {
        image: ov.image.clone().unwrap_or_else(|| base.image.clone()),
        command: ov.command.clone().unwrap_or_else(|| base.command.clone()),
        args: ov.args.clone().unwrap_or_else(|| base.args.clone()),
        env: ov.env.clone().unwrap_or_else(|| base.env.clone()),
        labels,
        annotations,
        resources: ov.resources.unwrap_or(base.resources),
        volume_claim_templates: ov
            .volume_claim_templates
            .clone()
            .unwrap_or_else(|| base.volume_claim_templates.clone()),
    }
}

/// Substitute `$(VAR)` placeholders into env values, command, and args.
/// Unknown placeholders are left verbatim.
fn substitute_spec(spec: &mut InstanceTemplateSpec, vars: &BTreeMap<String, String>) {
    if vars.is_empty() {
        return;
    }
    for item in spec.command.iter_mut().chain(spec.args.iter_mut()) {
        *item = substitute(item, vars);
    }
    for env in &mut spec.env {
        env.value = substitute(&env.value, vars);
    }
}

fn substitute(input: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("$(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find(')') {
            Some(end) => {
                let key = &after[..end];
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("$(");
                        out.push_str(key);
                        out.push(')');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
