//! # Flow Core
//!
//! Core business logic for the patient flow engine.
//!
//! This crate owns the queue of arriving patients and the encounters they generate:
//! - Queue entries and encounters, each behind a store with conditional (compare-and-set) updates
//! - The "who is next" ordering
//! - Journey actions that move an entry and its encounter together in one tenant transaction
//! - Per-tenant event topics with replay, and a client-side [`QueueView`] replica
//! - Optional JSON snapshots of each tenant under the configured data directory
//!
//! **No API concerns**: HTTP servers, authentication and wire formats belong in `api-rest` and
//! `api-shared`.

pub mod actor;
pub mod clock;
pub mod config;
pub mod constants;
pub mod directory;
pub mod encounter;
pub mod error;
pub mod journey;
pub mod ordering;
pub mod queue;
pub mod realtime;
pub mod snapshot;
pub mod tenant;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use actor::{Actor, ActorRole};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CoreConfig;
pub use directory::{InMemoryDirectory, PatientDirectory, PatientSummary};
pub use encounter::{
    ArtifactKind, ArtifactRef, Encounter, EncounterMode, EncounterStatus, EncounterWithHistory,
    StatusHistoryEntry,
};
pub use error::{ErrorKind, FlowError, FlowResult};
pub use journey::{
    legal_actions, pairing_is_consistent, JourneyAction, JourneyOutcome, PairingViolation,
};
pub use queue::{Change, EntryFilter, EntryPatch, NewEntry, QueueEntry, QueueStatus};
pub use realtime::{FlowEvent, FlowEventFrame, QueueView, TenantEventBus, ViewUpdate};
pub use snapshot::{SnapshotStore, TenantSnapshot};
pub use tenant::{FlowRegistry, TenantFlow, TenantState};

pub use flow_types::{NonEmptyText, Priority};
pub use flow_uuid::{ActorId, EncounterId, EntryId, PatientId, TenantId};
