//! # iset-identity
//!
//! Stable identities for InstanceSet members and their storage.
//!
//! ## Design Principles
//!
//! - Instance identities are structural, not random: an instance is
//!   addressed by its owning set, an optional template name, and an
//!   ordinal assigned by the allocator.
//! - Identities survive instance churn. A deleted instance that is
//!   recreated under the same ordinal is the *same* member and re-adopts
//!   the storage addressed by its claim identities.
//! - All identities have a canonical string representation with strict
//!   parsing (parse → format → parse round-trips).
//!
//! ## Identity Format
//!
//! - Instance: `{set}-{ordinal}` or `{set}-{template}-{ordinal}`
//! - Claim: `{claim-template}-{instance}`
//! - Request: `req_{ulid}` (per-pass correlation only, never persisted
//!   as an identity)

mod error;
mod name;
mod request;

pub use error::IdError;
pub use name::{ClaimName, InstanceName, SetRef};
pub use request::RequestId;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
