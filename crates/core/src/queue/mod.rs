//! Queue entries: one record per patient visit while the patient is physically present.
//!
//! - [`QueueEntry`] and [`QueueStatus`] are the data model.
//! - [`QueueStore`] holds a tenant's entries and exposes the compare-and-set primitive every
//!   status change goes through.
//! - The tenant-level operations (`add_entry`, `update_entry`, `reorder`, queries) live in
//!   `service.rs` as methods on [`crate::TenantFlow`].

mod service;
mod store;

pub use store::QueueStore;

use chrono::{DateTime, Utc};
use flow_types::Priority;
use flow_uuid::{ActorId, EncounterId, EntryId, PatientId, TenantId};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::FlowError;

/// Where a visit currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    Called,
    InConsultation,
    AwaitingExam,
    Completed,
    NoShow,
    Cancelled,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 7] = [
        QueueStatus::Waiting,
        QueueStatus::Called,
        QueueStatus::InConsultation,
        QueueStatus::AwaitingExam,
        QueueStatus::Completed,
        QueueStatus::NoShow,
        QueueStatus::Cancelled,
    ];

    /// Terminal entries are immutable history.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueStatus::Completed | QueueStatus::NoShow | QueueStatus::Cancelled
        )
    }

    /// Entries still waiting to be seen; only these take part in "who is next" ordering.
    pub fn is_pending(&self) -> bool {
        matches!(self, QueueStatus::Waiting | QueueStatus::Called)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::Called => "called",
            QueueStatus::InConsultation => "in_consultation",
            QueueStatus::AwaitingExam => "awaiting_exam",
            QueueStatus::Completed => "completed",
            QueueStatus::NoShow => "no_show",
            QueueStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| FlowError::Validation(format!("unknown queue status '{s}'")))
    }
}

/// A single patient visit tracked from arrival through completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub tenant_id: TenantId,
    pub patient_id: PatientId,
    pub status: QueueStatus,
    pub priority: Priority,
    /// Stamped by the store on arrival; never changes afterwards.
    pub arrival_time: DateTime<Utc>,
    /// Stamped when the patient is called.
    pub ready_at: Option<DateTime<Utc>>,
    pub manual_order: Option<i32>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub assigned_practitioner: Option<ActorId>,
    pub encounter_id: Option<EncounterId>,
    /// Row version, bumped on every successful mutation.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Arrival registration input.
#[derive(Clone, Debug, Default)]
pub struct NewEntry {
    pub patient_id: PatientId,
    pub priority: Priority,
    pub reason: Option<String>,
}

/// A three-way field update used by patches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Change<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T> Change<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Change::Keep)
    }

    /// Apply this change to `slot`.
    pub fn apply_to(self, slot: &mut Option<T>) {
        match self {
            Change::Keep => {}
            Change::Set(value) => *slot = Some(value),
            Change::Clear => *slot = None,
        }
    }
}

/// Staff edits to a non-terminal entry. Status is never patched; it only moves through journey
/// actions.
#[derive(Clone, Debug, Default)]
pub struct EntryPatch {
    pub priority: Option<Priority>,
    pub notes: Change<String>,
    pub reason: Change<String>,
    pub manual_order: Change<i32>,
    pub assigned_practitioner: Change<ActorId>,
    /// When set, the patch only applies if the stored row version still matches.
    pub expected_version: Option<u64>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.priority.is_none()
            && self.notes.is_keep()
            && self.reason.is_keep()
            && self.manual_order.is_keep()
            && self.assigned_practitioner.is_keep()
    }
}

/// Query filter for listing entries. Empty/`None` fields match everything.
#[derive(Clone, Debug, Default)]
pub struct EntryFilter {
    pub statuses: Vec<QueueStatus>,
    pub priority: Option<Priority>,
    pub arrived_from: Option<DateTime<Utc>>,
    pub arrived_until: Option<DateTime<Utc>>,
}

impl EntryFilter {
    pub fn matches(&self, entry: &QueueEntry) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&entry.status))
            && self.priority.map_or(true, |p| p == entry.priority)
            && self.arrived_from.map_or(true, |from| entry.arrival_time >= from)
            && self.arrived_until.map_or(true, |until| entry.arrival_time < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in QueueStatus::ALL {
            assert_eq!(status.as_str().parse::<QueueStatus>().unwrap(), status);
        }
        assert!("paused".parse::<QueueStatus>().is_err());
    }

    #[test]
    fn only_waiting_and_called_are_pending() {
        let pending: Vec<_> = QueueStatus::ALL
            .into_iter()
            .filter(QueueStatus::is_pending)
            .collect();
        assert_eq!(pending, vec![QueueStatus::Waiting, QueueStatus::Called]);
    }

    #[test]
    fn change_applies_set_and_clear() {
        let mut slot = Some(2);
        Change::Keep.apply_to(&mut slot);
        assert_eq!(slot, Some(2));
        Change::Set(5).apply_to(&mut slot);
        assert_eq!(slot, Some(5));
        Change::<i32>::Clear.apply_to(&mut slot);
        assert_eq!(slot, None);
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(EntryPatch::default().is_empty());
        let patch = EntryPatch {
            expected_version: Some(3),
            ..Default::default()
        };
        assert!(patch.is_empty());
    }
}
