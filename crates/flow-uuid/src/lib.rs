//! Canonical identifiers for the patient flow engine.
//!
//! Every record in the flow engine (tenants, patients, queue entries, encounters, actors) is
//! keyed by a UUID held in a *canonical* representation: **32 lowercase hexadecimal characters**
//! (no hyphens).
//!
//! This crate provides:
//! - [`CanonicalUuid`], a wrapper that guarantees the canonical format once constructed.
//! - Typed identifiers ([`TenantId`], [`PatientId`], [`EntryId`], [`EncounterId`],
//!   [`ActorId`]) so that a patient id can never be passed where an entry id is expected.
//! - Sharded directory derivation used for on-disk tenant snapshots.
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Non-canonical values (uppercase, hyphenated, wrong length, non-hex) are rejected by
//! [`CanonicalUuid::parse`].
//!
//! ## Sharded directory layout
//! For a canonical UUID `u`, data lives under `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`.

mod ids;

pub use ids::{ActorId, CanonicalUuid, EncounterId, EntryId, PatientId, TenantId, Uuid};

/// Error type for identifier operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
