use super::{
    ArtifactKind, ArtifactRef, Encounter, EncounterMode, EncounterStatus, EncounterWithHistory,
};
use crate::actor::Actor;
use crate::journey::pairing_is_consistent;
use crate::realtime::FlowEvent;
use crate::tenant::{TenantFlow, Txn};
use crate::{FlowError, FlowResult};
use flow_types::NonEmptyText;
use flow_uuid::{EncounterId, EntryId, PatientId};

impl TenantFlow {
    /// Open an encounter for a patient, or return the one already open today.
    ///
    /// At most one non-terminal encounter exists per patient per practice day. When that
    /// encounter already exists it is returned unchanged, except that a missing queue entry link
    /// is filled in from `queue_entry_id`.
    ///
    /// # Errors
    ///
    /// - [`FlowError::Validation`] if the patient is unknown to the directory or the queue entry
    ///   belongs to someone else.
    /// - [`FlowError::NotFound`] if `queue_entry_id` does not exist.
    /// - [`FlowError::InvalidState`] if the queue entry is already terminal.
    /// - [`FlowError::LockedState`] if the queue entry is past `called` without an open encounter.
    pub fn create_encounter(
        &self,
        patient_id: PatientId,
        mode: EncounterMode,
        queue_entry_id: Option<EntryId>,
        actor: &Actor,
    ) -> FlowResult<Encounter> {
        let tenant_id = self.tenant_id();
        if self.directory().lookup(&tenant_id, &patient_id).is_none() {
            return Err(FlowError::Validation(format!(
                "patient {patient_id} is not registered with tenant {tenant_id}"
            )));
        }
        let offset = self.config().utc_offset();

        let (encounter, created) = self.transact(|txn| {
            if let Some(entry_id) = &queue_entry_id {
                let entry = txn.state.queue.require(entry_id)?;
                if entry.patient_id != patient_id {
                    return Err(FlowError::Validation(format!(
                        "queue entry {entry_id} belongs to a different patient"
                    )));
                }
                if entry.status.is_terminal() {
                    return Err(FlowError::invalid_state(
                        "queue entry",
                        entry_id,
                        entry.status,
                    ));
                }
                let (entry_status, linked) = (entry.status, entry.encounter_id);

                // The entry's own open encounter wins, even if it was opened on another day.
                if let Some(open) = linked
                    .and_then(|id| txn.state.encounters.get(&id))
                    .filter(|e| !e.status.is_terminal())
                {
                    return Ok((open.clone(), false));
                }
                if !entry_status.is_pending() {
                    return Err(FlowError::LockedState(format!(
                        "queue entry {entry_id} is {entry_status}; its encounter can only change \
                         through queue actions"
                    )));
                }
            }

            let day = self.config().practice_day(txn.now);
            if let Some(existing) = txn
                .state
                .encounters
                .active_for_patient_on(&patient_id, day, offset)
                .cloned()
            {
                let (Some(entry_id), None) = (queue_entry_id, existing.queue_entry_id) else {
                    return Ok((existing, false));
                };
                let encounter = link(txn, existing.id, entry_id)?;
                return Ok((encounter, false));
            }

            let encounter = Encounter {
                id: EncounterId::new(),
                tenant_id,
                patient_id,
                queue_entry_id: None,
                mode,
                status: EncounterStatus::Created,
                created_at: txn.now,
                started_at: None,
                closed_at: None,
                artifacts: Vec::new(),
                version: 1,
                updated_at: txn.now,
            };
            txn.state.encounters.insert(encounter.clone(), actor.id);
            let encounter = match queue_entry_id {
                Some(entry_id) => link(txn, encounter.id, entry_id)?,
                None => {
                    txn.emit(FlowEvent::EncounterChanged {
                        encounter: encounter.clone(),
                    });
                    encounter
                }
            };
            Ok((encounter, true))
        })?;

        if created {
            tracing::info!(
                tenant = %tenant_id,
                encounter = %encounter.id,
                actor = %actor.id,
                mode = %encounter.mode,
                "encounter created"
            );
        } else {
            tracing::debug!(
                tenant = %tenant_id,
                encounter = %encounter.id,
                "returned today's open encounter"
            );
        }
        Ok(encounter)
    }

    /// Move an encounter to `next`, recording the change in its status history.
    ///
    /// An encounter linked to an open queue entry may only move to a status that stays paired
    /// with the entry; anything else has to go through the queue action.
    ///
    /// # Errors
    ///
    /// - [`FlowError::NotFound`] if the encounter does not exist.
    /// - [`FlowError::InvalidTransition`] if `next` is not reachable from `expected`.
    /// - [`FlowError::StaleState`] if the stored status is no longer `expected`.
    /// - [`FlowError::LockedState`] if the change would break the queue pairing.
    pub fn update_encounter_status(
        &self,
        id: &EncounterId,
        expected: EncounterStatus,
        next: EncounterStatus,
        actor: &Actor,
    ) -> FlowResult<Encounter> {
        let encounter = self.transact(|txn| {
            let encounter = txn
                .state
                .encounters
                .transition(id, expected, next, actor.id, txn.now)?
                .clone();

            if let Some(entry) = encounter
                .queue_entry_id
                .and_then(|entry_id| txn.state.queue.get(&entry_id))
            {
                if !entry.status.is_terminal() && !pairing_is_consistent(entry.status, Some(next))
                {
                    return Err(FlowError::LockedState(format!(
                        "encounter {id} is linked to queue entry {} ({}); drive this change through the queue action",
                        entry.id, entry.status
                    )));
                }
            }

            txn.emit(FlowEvent::EncounterChanged {
                encounter: encounter.clone(),
            });
            Ok(encounter)
        })?;

        tracing::info!(
            tenant = %self.tenant_id(),
            encounter = %id,
            actor = %actor.id,
            from = %expected,
            to = %next,
            "encounter status changed"
        );
        Ok(encounter)
    }

    /// Switch between solo and team mode before the consultation starts.
    ///
    /// # Errors
    ///
    /// [`FlowError::LockedState`] once the encounter has left `created`/`preconsult_in_progress`.
    pub fn update_encounter_mode(
        &self,
        id: &EncounterId,
        mode: EncounterMode,
        actor: &Actor,
    ) -> FlowResult<Encounter> {
        let encounter = self.transact(|txn| {
            let before = txn.state.encounters.require(id)?.version;
            let encounter = txn.state.encounters.set_mode(id, mode, txn.now)?.clone();
            if encounter.version != before {
                txn.emit(FlowEvent::EncounterChanged {
                    encounter: encounter.clone(),
                });
            }
            Ok(encounter)
        })?;

        tracing::info!(
            tenant = %self.tenant_id(),
            encounter = %id,
            actor = %actor.id,
            mode = %mode,
            "encounter mode set"
        );
        Ok(encounter)
    }

    pub fn get_encounter(&self, id: &EncounterId) -> FlowResult<EncounterWithHistory> {
        self.read(|state| state.encounters.with_history(id))?
    }

    /// Attach a reference to clinical text or OCR output produced elsewhere.
    ///
    /// # Errors
    ///
    /// - [`FlowError::Type`] if `reference` is blank.
    /// - [`FlowError::InvalidState`] if the encounter was cancelled.
    pub fn attach_artifact(
        &self,
        id: &EncounterId,
        kind: ArtifactKind,
        reference: &str,
        actor: &Actor,
    ) -> FlowResult<Encounter> {
        let reference = NonEmptyText::new(reference)?;

        let encounter = self.transact(|txn| {
            let artifact = ArtifactRef {
                kind,
                reference,
                attached_at: txn.now,
                attached_by: actor.id,
            };
            let encounter = txn.state.encounters.attach_artifact(id, artifact)?.clone();
            txn.emit(FlowEvent::EncounterChanged {
                encounter: encounter.clone(),
            });
            Ok(encounter)
        })?;

        tracing::info!(
            tenant = %self.tenant_id(),
            encounter = %id,
            actor = %actor.id,
            kind = kind.as_str(),
            "artifact attached"
        );
        Ok(encounter)
    }
}

/// Link an encounter and a queue entry in both directions and announce both records.
fn link(
    txn: &mut Txn<'_>,
    encounter_id: EncounterId,
    entry_id: EntryId,
) -> FlowResult<Encounter> {
    let encounter = txn
        .state
        .encounters
        .link_entry(&encounter_id, entry_id, txn.now)?
        .clone();
    let entry = txn
        .state
        .queue
        .link_encounter(&entry_id, encounter_id, txn.now)?
        .clone();
    txn.emit(FlowEvent::EncounterChanged {
        encounter: encounter.clone(),
    });
    txn.emit(FlowEvent::EntryUpdated { entry });
    Ok(encounter)
}
