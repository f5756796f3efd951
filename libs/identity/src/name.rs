//! Structural identities for sets, instances, and storage claims.

use std::fmt;

use crate::IdError;

/// Validate a DNS-label-style name segment: non-empty, lowercase
/// alphanumeric or '-', must not start or end with '-'.
fn check_segment(s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    let valid_chars = s
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_chars || s.starts_with('-') || s.ends_with('-') {
        return Err(IdError::InvalidSegment(s.to_string()));
    }
    Ok(())
}

/// Reference to an InstanceSet object: namespace + name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SetRef {
    pub namespace: String,
    pub name: String,
}

impl SetRef {
    /// Create a validated set reference.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self, IdError> {
        let namespace = namespace.into();
        let name = name.into();
        check_segment(&namespace)?;
        check_segment(&name)?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for SetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The stable identity of one instance within an InstanceSet.
///
/// Formatted as `{set}-{ordinal}` for instances of the base template and
/// `{set}-{template}-{ordinal}` for instances of a named instance
/// template. The ordinal is assigned by the allocator and never carries
/// ordering semantics beyond its numeric value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceName {
    set: String,
    template: Option<String>,
    ordinal: u32,
}

impl InstanceName {
    /// Create an identity for an instance of the base template.
    pub fn base(set: impl Into<String>, ordinal: u32) -> Result<Self, IdError> {
        let set = set.into();
        check_segment(&set)?;
        Ok(Self {
            set,
            template: None,
            ordinal,
        })
    }

    /// Create an identity for an instance of a named template.
    pub fn templated(
        set: impl Into<String>,
        template: impl Into<String>,
        ordinal: u32,
    ) -> Result<Self, IdError> {
        let set = set.into();
        let template = template.into();
        check_segment(&set)?;
        check_segment(&template)?;
        Ok(Self {
            set,
            template: Some(template),
            ordinal,
        })
    }

    /// Parse an identity relative to its owning set's name.
    ///
    /// Set names may themselves contain '-', so parsing is only defined
    /// when the owner is known.
    pub fn parse(set: &str, s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let rest = s
            .strip_prefix(set)
            .and_then(|r| r.strip_prefix('-'))
            .ok_or_else(|| IdError::ForeignSet {
                set: set.to_string(),
                actual: s.to_string(),
            })?;
        if rest.is_empty() {
            return Err(IdError::MissingOrdinal(s.to_string()));
        }

        let (template, ordinal_str) = match rest.rsplit_once('-') {
            Some((tmpl, ord)) => (Some(tmpl), ord),
            None => (None, rest),
        };
        let ordinal: u32 = ordinal_str
            .parse()
            .map_err(|_| IdError::InvalidOrdinal {
                name: s.to_string(),
                ordinal: ordinal_str.to_string(),
            })?;

        match template {
            Some(t) => Self::templated(set, t, ordinal),
            None => Self::base(set, ordinal),
        }
    }

    /// The owning set's name.
    pub fn set(&self) -> &str {
        &self.set
    }

    /// The instance template this identity belongs to, if any.
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// The allocator-assigned ordinal.
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.template {
            Some(t) => write!(f, "{}-{}-{}", self.set, t, self.ordinal),
            None => write!(f, "{}-{}", self.set, self.ordinal),
        }
    }
}

/// The identity of a persistent claim attached to an instance.
///
/// Formatted as `{claim-template}-{instance}`, matching the instance
/// identity so retained storage can be re-adopted by a future instance
/// with the same name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClaimName {
    template: String,
    instance: InstanceName,
}

impl ClaimName {
    /// Create a claim identity from its volume-claim-template name and
    /// the owning instance.
    pub fn new(template: impl Into<String>, instance: InstanceName) -> Result<Self, IdError> {
        let template = template.into();
        check_segment(&template)?;
        Ok(Self { template, instance })
    }

    /// The volume-claim-template name.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The instance this claim is addressed to.
    pub fn instance(&self) -> &InstanceName {
        &self.instance
    }
}

impl fmt::Display for ClaimName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.template, self.instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn base_identity_roundtrip() {
        let name = InstanceName::base("pg", 3).unwrap();
        assert_eq!(name.to_string(), "pg-3");
        let parsed = InstanceName::parse("pg", "pg-3").unwrap();
        assert_eq!(parsed, name);
        assert_eq!(parsed.template(), None);
        assert_eq!(parsed.ordinal(), 3);
    }

    #[test]
    fn templated_identity_roundtrip() {
        let name = InstanceName::templated("pg-cluster", "repl", 0).unwrap();
        assert_eq!(name.to_string(), "pg-cluster-repl-0");
        let parsed = InstanceName::parse("pg-cluster", "pg-cluster-repl-0").unwrap();
        assert_eq!(parsed, name);
        assert_eq!(parsed.template(), Some("repl"));
    }

    #[test]
    fn template_with_dashes() {
        let parsed = InstanceName::parse("pg", "pg-read-only-2").unwrap();
        assert_eq!(parsed.template(), Some("read-only"));
        assert_eq!(parsed.ordinal(), 2);
    }

    #[test]
    fn rejects_foreign_set() {
        let err = InstanceName::parse("pg", "mysql-0").unwrap_err();
        assert!(matches!(err, IdError::ForeignSet { .. }));
    }

    #[test]
    fn rejects_missing_ordinal() {
        assert!(InstanceName::parse("pg", "pg-").is_err());
        assert!(matches!(
            InstanceName::parse("pg", "pg-repl-x"),
            Err(IdError::InvalidOrdinal { .. })
        ));
    }

    #[test]
    fn rejects_invalid_segments() {
        assert!(InstanceName::base("Pg", 0).is_err());
        assert!(InstanceName::templated("pg", "-bad", 0).is_err());
        assert!(SetRef::new("ns", "").is_err());
    }

    #[test]
    fn ordering_is_by_template_then_ordinal() {
        let a = InstanceName::base("pg", 1).unwrap();
        let b = InstanceName::base("pg", 2).unwrap();
        let c = InstanceName::templated("pg", "repl", 0).unwrap();
        assert!(a < b);
        // Base-template identities sort before templated ones.
        assert!(b < c);
    }

    #[test]
    fn claim_name_format() {
        let inst = InstanceName::base("pg", 0).unwrap();
        let claim = ClaimName::new("data", inst).unwrap();
        assert_eq!(claim.to_string(), "data-pg-0");
    }

    proptest! {
        #[test]
        fn parse_format_roundtrip(
            set in "[a-z][a-z0-9-]{0,12}[a-z0-9]",
            template in proptest::option::of("[a-z][a-z0-9]{0,8}"),
            ordinal in 0u32..10_000,
        ) {
            let name = match &template {
                Some(t) => InstanceName::templated(&set, t, ordinal).unwrap(),
                None => InstanceName::base(&set, ordinal).unwrap(),
            };
            let parsed = InstanceName::parse(&set, &name.to_string()).unwrap();
            prop_assert_eq!(parsed, name);
        }
    }
}
