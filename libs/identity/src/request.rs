//! Per-pass request correlation IDs.

use std::fmt;
use std::str::FromStr;

use ulid::Ulid;

use crate::IdError;

/// Correlation ID for one reconcile pass.
///
/// ULID-based so log lines from one pass sort together; formatted as
/// `req_{ulid}`. Request IDs are ephemeral and never used as resource
/// identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(Ulid);

impl RequestId {
    const PREFIX: &'static str = "req";

    /// Generate a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a request ID from its `req_{ulid}` form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let ulid_str = s
            .strip_prefix(Self::PREFIX)
            .and_then(|r| r.strip_prefix('_'))
            .ok_or_else(|| IdError::MissingPrefix(s.to_string()))?;
        let ulid = ulid_str
            .parse::<Ulid>()
            .map_err(|e| IdError::InvalidUlid(e.to_string()))?;
        Ok(Self(ulid))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", Self::PREFIX, self.0)
    }
}

impl FromStr for RequestId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for RequestId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for RequestId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
