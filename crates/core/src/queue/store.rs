use super::{Change, EntryFilter, EntryPatch, QueueEntry, QueueStatus};
use crate::{FlowError, FlowResult};
use chrono::{DateTime, Utc};
use flow_uuid::{EncounterId, EntryId, PatientId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ENTITY: &str = "queue entry";

/// A tenant's queue entries, keyed by id.
///
/// Every mutation bumps the row `version` and `updated_at`. Status only changes through
/// [`QueueStore::compare_and_set`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "Vec<QueueEntry>", into = "Vec<QueueEntry>")]
pub struct QueueStore {
    entries: BTreeMap<EntryId, QueueEntry>,
}

impl From<Vec<QueueEntry>> for QueueStore {
    fn from(entries: Vec<QueueEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.id, e)).collect(),
        }
    }
}

impl From<QueueStore> for Vec<QueueEntry> {
    fn from(store: QueueStore) -> Self {
        store.entries.into_values().collect()
    }
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert(&mut self, entry: QueueEntry) {
        self.entries.insert(entry.id, entry);
    }

    pub fn get(&self, id: &EntryId) -> Option<&QueueEntry> {
        self.entries.get(id)
    }

    /// Like [`QueueStore::get`] but a missing entry is a [`FlowError::NotFound`].
    pub fn require(&self, id: &EntryId) -> FlowResult<&QueueEntry> {
        self.entries
            .get(id)
            .ok_or_else(|| FlowError::not_found(ENTITY, id))
    }

    fn require_mut(&mut self, id: &EntryId) -> FlowResult<&mut QueueEntry> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| FlowError::not_found(ENTITY, id))
    }

    /// The patient's current non-terminal entry, if any.
    pub fn active_for_patient(&self, patient_id: &PatientId) -> Option<&QueueEntry> {
        self.entries
            .values()
            .find(|e| e.patient_id == *patient_id && !e.status.is_terminal())
    }

    pub fn list(&self, filter: &EntryFilter) -> Vec<QueueEntry> {
        self.entries
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// Entries taking part in "who is next" ordering.
    pub fn pending(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.values().filter(|e| e.status.is_pending())
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.values()
    }

    /// Move an entry from `expected` to `next`, failing if the stored status has moved on.
    ///
    /// Stamps `ready_at` when the entry becomes `called` and drops any manual order once the
    /// entry leaves the pending set. Transition legality is the caller's concern.
    ///
    /// # Errors
    ///
    /// - [`FlowError::NotFound`] if there is no such entry.
    /// - [`FlowError::StaleState`] if the stored status differs from `expected`.
    /// - [`FlowError::InvalidState`] if the entry is already terminal.
    pub fn compare_and_set(
        &mut self,
        id: &EntryId,
        expected: QueueStatus,
        next: QueueStatus,
        at: DateTime<Utc>,
    ) -> FlowResult<&QueueEntry> {
        let entry = self.require_mut(id)?;
        if entry.status != expected {
            return Err(FlowError::stale(ENTITY, id, expected, entry.status));
        }
        if entry.status.is_terminal() {
            return Err(FlowError::invalid_state(ENTITY, id, entry.status));
        }

        entry.status = next;
        if next == QueueStatus::Called {
            entry.ready_at = Some(at);
        }
        if !next.is_pending() {
            entry.manual_order = None;
        }
        touch(entry, at);
        Ok(entry)
    }

    /// Apply a staff edit to a non-terminal entry. A manual order can only be set while the
    /// entry is waiting or called.
    ///
    /// Free-text fields are expected to be normalised already.
    pub fn apply_patch(
        &mut self,
        id: &EntryId,
        patch: EntryPatch,
        at: DateTime<Utc>,
    ) -> FlowResult<&QueueEntry> {
        let entry = self.require_mut(id)?;
        if entry.status.is_terminal() {
            return Err(FlowError::invalid_state(ENTITY, id, entry.status));
        }
        if let Some(expected) = patch.expected_version {
            if entry.version != expected {
                return Err(FlowError::stale(
                    ENTITY,
                    id,
                    format!("version {expected}"),
                    format!("at version {}", entry.version),
                ));
            }
        }
        if matches!(patch.manual_order, Change::Set(_)) && !entry.status.is_pending() {
            return Err(FlowError::invalid_state(ENTITY, id, entry.status));
        }

        if let Some(priority) = patch.priority {
            entry.priority = priority;
        }
        patch.notes.apply_to(&mut entry.notes);
        patch.reason.apply_to(&mut entry.reason);
        patch.manual_order.apply_to(&mut entry.manual_order);
        patch
            .assigned_practitioner
            .apply_to(&mut entry.assigned_practitioner);
        touch(entry, at);
        Ok(entry)
    }

    /// Set or clear the manual order of a pending entry. Returns `false` if nothing changed.
    pub(crate) fn set_manual_order(
        &mut self,
        id: &EntryId,
        manual_order: Option<i32>,
        at: DateTime<Utc>,
    ) -> FlowResult<bool> {
        let entry = self.require_mut(id)?;
        if !entry.status.is_pending() {
            return Err(FlowError::invalid_state(ENTITY, id, entry.status));
        }
        if entry.manual_order == manual_order {
            return Ok(false);
        }
        entry.manual_order = manual_order;
        touch(entry, at);
        Ok(true)
    }

    pub(crate) fn link_encounter(
        &mut self,
        id: &EntryId,
        encounter_id: EncounterId,
        at: DateTime<Utc>,
    ) -> FlowResult<&QueueEntry> {
        let entry = self.require_mut(id)?;
        if entry.encounter_id != Some(encounter_id) {
            entry.encounter_id = Some(encounter_id);
            touch(entry, at);
        }
        Ok(entry)
    }
}

fn touch(entry: &mut QueueEntry, at: DateTime<Utc>) {
    entry.version += 1;
    entry.updated_at = at;
}
