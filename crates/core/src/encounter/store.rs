use super::{
    ArtifactRef, Encounter, EncounterMode, EncounterStatus, EncounterWithHistory,
    StatusHistoryEntry,
};
use crate::{FlowError, FlowResult};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use flow_uuid::{ActorId, EncounterId, EntryId, PatientId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ENTITY: &str = "encounter";

/// A tenant's encounters and their status histories.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "Vec<EncounterWithHistory>", into = "Vec<EncounterWithHistory>")]
pub struct EncounterStore {
    records: BTreeMap<EncounterId, EncounterWithHistory>,
}

impl From<Vec<EncounterWithHistory>> for EncounterStore {
    fn from(records: Vec<EncounterWithHistory>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| (r.encounter.id, r))
                .collect(),
        }
    }
}

impl From<EncounterStore> for Vec<EncounterWithHistory> {
    fn from(store: EncounterStore) -> Self {
        store.records.into_values().collect()
    }
}

impl EncounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a freshly created encounter and record its initial status.
    pub(crate) fn insert(&mut self, encounter: Encounter, actor_id: ActorId) {
        let history = vec![StatusHistoryEntry {
            encounter_id: encounter.id,
            status: encounter.status,
            at: encounter.created_at,
            actor_id,
        }];
        self.records
            .insert(encounter.id, EncounterWithHistory { encounter, history });
    }

    pub fn get(&self, id: &EncounterId) -> Option<&Encounter> {
        self.records.get(id).map(|r| &r.encounter)
    }

    pub fn require(&self, id: &EncounterId) -> FlowResult<&Encounter> {
        self.get(id).ok_or_else(|| FlowError::not_found(ENTITY, id))
    }

    /// The encounter with its full history.
    pub fn with_history(&self, id: &EncounterId) -> FlowResult<EncounterWithHistory> {
        self.records
            .get(id)
            .cloned()
            .ok_or_else(|| FlowError::not_found(ENTITY, id))
    }

    pub fn history(&self, id: &EncounterId) -> FlowResult<&[StatusHistoryEntry]> {
        self.records
            .get(id)
            .map(|r| r.history.as_slice())
            .ok_or_else(|| FlowError::not_found(ENTITY, id))
    }

    fn require_mut(&mut self, id: &EncounterId) -> FlowResult<&mut EncounterWithHistory> {
        self.records
            .get_mut(id)
            .ok_or_else(|| FlowError::not_found(ENTITY, id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Encounter> {
        self.records.values().map(|r| &r.encounter)
    }

    /// The patient's non-terminal encounter created on practice day `day`, if any.
    pub fn active_for_patient_on(
        &self,
        patient_id: &PatientId,
        day: NaiveDate,
        offset: FixedOffset,
    ) -> Option<&Encounter> {
        self.iter().find(|e| {
            e.patient_id == *patient_id
                && !e.status.is_terminal()
                && e.created_at.with_timezone(&offset).date_naive() == day
        })
    }

    /// Move an encounter from `expected` to `next` and append the history row.
    ///
    /// History timestamps are strictly increasing per encounter: if `at` is not after the last
    /// recorded timestamp it is moved to one microsecond past it.
    ///
    /// # Errors
    ///
    /// - [`FlowError::NotFound`] if there is no such encounter.
    /// - [`FlowError::InvalidTransition`] if `next` is not reachable from `expected`.
    /// - [`FlowError::StaleState`] if the stored status differs from `expected`.
    pub fn transition(
        &mut self,
        id: &EncounterId,
        expected: EncounterStatus,
        next: EncounterStatus,
        actor_id: ActorId,
        at: DateTime<Utc>,
    ) -> FlowResult<&Encounter> {
        let record = self.require_mut(id)?;
        if !expected.can_transition_to(next) {
            return Err(FlowError::invalid_transition(
                ENTITY,
                id,
                expected,
                format!("move to {next}"),
            ));
        }
        let encounter = &mut record.encounter;
        if encounter.status != expected {
            return Err(FlowError::stale(ENTITY, id, expected, encounter.status));
        }

        let at = match record.history.last() {
            Some(last) if at <= last.at => last.at + Duration::microseconds(1),
            _ => at,
        };

        encounter.status = next;
        if next == EncounterStatus::ConsultationInProgress && encounter.started_at.is_none() {
            encounter.started_at = Some(at);
        }
        if next.is_terminal() {
            encounter.closed_at = Some(at);
        }
        encounter.version += 1;
        encounter.updated_at = at;
        record.history.push(StatusHistoryEntry {
            encounter_id: *id,
            status: next,
            at,
            actor_id,
        });
        Ok(&record.encounter)
    }

    /// Change the solo/team mode.
    ///
    /// # Errors
    ///
    /// [`FlowError::LockedState`] once the consultation has started.
    pub fn set_mode(
        &mut self,
        id: &EncounterId,
        mode: EncounterMode,
        at: DateTime<Utc>,
    ) -> FlowResult<&Encounter> {
        let encounter = &mut self.require_mut(id)?.encounter;
        if !encounter.status.mode_is_editable() {
            return Err(FlowError::LockedState(format!(
                "encounter {id} mode cannot change once it is {}",
                encounter.status
            )));
        }
        if encounter.mode != mode {
            encounter.mode = mode;
            encounter.version += 1;
            encounter.updated_at = at;
        }
        Ok(encounter)
    }

    pub(crate) fn link_entry(
        &mut self,
        id: &EncounterId,
        entry_id: EntryId,
        at: DateTime<Utc>,
    ) -> FlowResult<&Encounter> {
        let encounter = &mut self.require_mut(id)?.encounter;
        if encounter.queue_entry_id != Some(entry_id) {
            encounter.queue_entry_id = Some(entry_id);
            encounter.version += 1;
            encounter.updated_at = at;
        }
        Ok(encounter)
    }

    /// Record a reference to externally produced clinical text or OCR output.
    ///
    /// # Errors
    ///
    /// [`FlowError::InvalidState`] on a cancelled encounter.
    pub fn attach_artifact(
        &mut self,
        id: &EncounterId,
        artifact: ArtifactRef,
    ) -> FlowResult<&Encounter> {
        let encounter = &mut self.require_mut(id)?.encounter;
        if encounter.status == EncounterStatus::Cancelled {
            return Err(FlowError::invalid_state(ENTITY, id, encounter.status));
        }
        encounter.version += 1;
        encounter.updated_at = artifact.attached_at;
        encounter.artifacts.push(artifact);
        Ok(encounter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encounter::ArtifactKind;
    use chrono::TimeZone;
    use flow_types::NonEmptyText;
    use flow_uuid::{TenantId, Uuid};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, hour, minute, 0).unwrap()
    }

    fn encounter(n: u128) -> Encounter {
        Encounter {
            id: EncounterId::from_uuid(Uuid::from_u128(n)),
            tenant_id: TenantId::from_uuid(Uuid::from_u128(1)),
            patient_id: PatientId::from_uuid(Uuid::from_u128(50)),
            queue_entry_id: None,
            mode: EncounterMode::Solo,
            status: EncounterStatus::Created,
            created_at: at(9, 0),
            started_at: None,
            closed_at: None,
            artifacts: Vec::new(),
            version: 1,
            updated_at: at(9, 0),
        }
    }

    fn actor() -> ActorId {
        ActorId::from_uuid(Uuid::from_u128(7))
    }

    #[test]
    fn history_timestamps_strictly_increase() {
        let mut store = EncounterStore::new();
        let e = encounter(1);
        store.insert(e.clone(), actor());

        // Same instant for every step.
        let t = at(9, 0);
        store
            .transition(&e.id, EncounterStatus::Created, EncounterStatus::PreconsultInProgress, actor(), t)
            .unwrap();
        store
            .transition(
                &e.id,
                EncounterStatus::PreconsultInProgress,
                EncounterStatus::ConsultationInProgress,
                actor(),
                t,
            )
            .unwrap();

        let history = store.history(&e.id).unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].at < w[1].at));
        assert_eq!(
            store.get(&e.id).unwrap().started_at,
            Some(history[2].at)
        );
    }

    #[test]
    fn unreachable_status_is_an_invalid_transition() {
        let mut store = EncounterStore::new();
        let e = encounter(1);
        store.insert(e.clone(), actor());

        let err = store
            .transition(&e.id, EncounterStatus::Created, EncounterStatus::Completed, actor(), at(9, 5))
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidTransition { .. }));
        assert_eq!(store.history(&e.id).unwrap().len(), 1);
    }

    #[test]
    fn stale_expected_status_is_rejected() {
        let mut store = EncounterStore::new();
        let e = encounter(1);
        store.insert(e.clone(), actor());

        let err = store
            .transition(
                &e.id,
                EncounterStatus::PreconsultInProgress,
                EncounterStatus::ConsultationInProgress,
                actor(),
                at(9, 5),
            )
            .unwrap_err();
        assert!(matches!(err, FlowError::StaleState { .. }));
    }

    #[test]
    fn mode_locks_once_consultation_starts() {
        let mut store = EncounterStore::new();
        let e = encounter(1);
        store.insert(e.clone(), actor());
        store.set_mode(&e.id, EncounterMode::Team, at(9, 1)).unwrap();

        store
            .transition(&e.id, EncounterStatus::Created, EncounterStatus::PreconsultInProgress, actor(), at(9, 2))
            .unwrap();
        store
            .transition(
                &e.id,
                EncounterStatus::PreconsultInProgress,
                EncounterStatus::ConsultationInProgress,
                actor(),
                at(9, 3),
            )
            .unwrap();

        let err = store.set_mode(&e.id, EncounterMode::Solo, at(9, 4)).unwrap_err();
        assert!(matches!(err, FlowError::LockedState(_)));
        assert_eq!(store.get(&e.id).unwrap().mode, EncounterMode::Team);
    }

    #[test]
    fn artifacts_are_refused_on_cancelled_encounters() {
        let mut store = EncounterStore::new();
        let e = encounter(1);
        store.insert(e.clone(), actor());
        store
            .transition(&e.id, EncounterStatus::Created, EncounterStatus::Cancelled, actor(), at(9, 2))
            .unwrap();

        let artifact = ArtifactRef {
            kind: ArtifactKind::OcrResult,
            reference: NonEmptyText::new("ocr://scan/42").unwrap(),
            attached_at: at(9, 3),
            attached_by: actor(),
        };
        let err = store.attach_artifact(&e.id, artifact).unwrap_err();
        assert!(matches!(err, FlowError::InvalidState { .. }));
    }

    #[test]
    fn active_lookup_uses_the_practice_day() {
        let mut store = EncounterStore::new();
        let mut e = encounter(1);
        // 23:30 UTC on the 1st is already the 2nd at UTC+2.
        e.created_at = Utc.with_ymd_and_hms(2026, 2, 1, 23, 30, 0).unwrap();
        store.insert(e.clone(), actor());

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        assert!(store.active_for_patient_on(&e.patient_id, day, plus_two).is_some());
        let utc = FixedOffset::east_opt(0).unwrap();
        assert!(store.active_for_patient_on(&e.patient_id, day, utc).is_none());
    }
}
