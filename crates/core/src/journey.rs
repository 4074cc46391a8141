//! Journey orchestration: the legal actions on a queue entry and what each one does to the
//! linked encounter.
//!
//! | action             | from                | to               | encounter                      |
//! |--------------------|---------------------|------------------|--------------------------------|
//! | `call`             | waiting             | called           | untouched                      |
//! | `start`            | called              | in_consultation  | walked to consultation         |
//! | `send_to_exam`     | in_consultation     | awaiting_exam    | consultation → awaiting_exam   |
//! | `return_from_exam` | awaiting_exam       | in_consultation  | awaiting_exam → consultation   |
//! | `complete`         | in_consultation     | completed        | → completed                    |
//! | `no_show`          | waiting, called     | no_show          | open encounter → cancelled     |
//! | `cancel`           | any non-terminal    | cancelled        | open encounter → cancelled     |
//!
//! Each action runs in one tenant transaction, so the entry and the encounter either both move
//! or neither does. Callers pass the status they last saw; the action is checked against that
//! status first and then against the stored one, so a caller who lost a race gets
//! [`FlowError::StaleState`] naming what the entry actually is now.

use crate::actor::Actor;
use crate::encounter::{Encounter, EncounterMode, EncounterStatus};
use crate::queue::{QueueEntry, QueueStatus};
use crate::realtime::FlowEvent;
use crate::tenant::{TenantFlow, Txn};
use crate::{FlowError, FlowResult};
use flow_uuid::{EncounterId, EntryId};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

const ENTRY: &str = "queue entry";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyAction {
    Call,
    Start,
    SendToExam,
    ReturnFromExam,
    Complete,
    NoShow,
    Cancel,
}

impl JourneyAction {
    pub const ALL: [JourneyAction; 7] = [
        JourneyAction::Call,
        JourneyAction::Start,
        JourneyAction::SendToExam,
        JourneyAction::ReturnFromExam,
        JourneyAction::Complete,
        JourneyAction::NoShow,
        JourneyAction::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JourneyAction::Call => "call",
            JourneyAction::Start => "start",
            JourneyAction::SendToExam => "send_to_exam",
            JourneyAction::ReturnFromExam => "return_from_exam",
            JourneyAction::Complete => "complete",
            JourneyAction::NoShow => "no_show",
            JourneyAction::Cancel => "cancel",
        }
    }

    /// The status this action leads to from `from`, or `None` if it is not allowed there.
    pub fn target(&self, from: QueueStatus) -> Option<QueueStatus> {
        use QueueStatus::*;

        match (self, from) {
            (JourneyAction::Call, Waiting) => Some(Called),
            (JourneyAction::Start, Called) => Some(InConsultation),
            (JourneyAction::SendToExam, InConsultation) => Some(AwaitingExam),
            (JourneyAction::ReturnFromExam, AwaitingExam) => Some(InConsultation),
            (JourneyAction::Complete, InConsultation) => Some(Completed),
            (JourneyAction::NoShow, Waiting | Called) => Some(NoShow),
            (JourneyAction::Cancel, status) if !status.is_terminal() => Some(Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for JourneyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JourneyAction {
    type Err = FlowError;

    /// Accepts `snake_case` and `camelCase` names (`no_show` or `noShow`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s.trim().chars().filter(|c| *c != '_').collect();
        JourneyAction::ALL
            .into_iter()
            .find(|action| action.as_str().replace('_', "").eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| FlowError::Validation(format!("unknown journey action '{s}'")))
    }
}

/// Actions a viewer should offer for an entry in `status`.
pub fn legal_actions(status: QueueStatus) -> Vec<JourneyAction> {
    JourneyAction::ALL
        .into_iter()
        .filter(|action| action.target(status).is_some())
        .collect()
}

/// Whether a queue entry status and its encounter status may be observed together.
pub fn pairing_is_consistent(entry: QueueStatus, encounter: Option<EncounterStatus>) -> bool {
    use EncounterStatus as E;
    use QueueStatus as Q;

    match entry {
        Q::Waiting | Q::Called => matches!(
            encounter,
            None | Some(E::Created) | Some(E::PreconsultInProgress)
        ),
        Q::InConsultation => encounter == Some(E::ConsultationInProgress),
        Q::AwaitingExam => encounter == Some(E::AwaitingExam),
        Q::Completed => encounter == Some(E::Completed),
        Q::NoShow | Q::Cancelled => encounter.map_or(true, |status| status.is_terminal()),
    }
}

/// Result of a committed journey action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyOutcome {
    pub action: JourneyAction,
    pub from: QueueStatus,
    pub entry: QueueEntry,
    pub encounter: Option<Encounter>,
}

/// An entry whose encounter does not pair with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairingViolation {
    pub entry_id: EntryId,
    pub entry_status: QueueStatus,
    pub encounter_status: Option<EncounterStatus>,
}

impl TenantFlow {
    /// Perform `action` on an entry the caller last saw in `expected` status.
    ///
    /// # Errors
    ///
    /// - [`FlowError::NotFound`] if the entry does not exist.
    /// - [`FlowError::InvalidTransition`] if the stored entry is terminal, or `action` is not
    ///   allowed from `expected`.
    /// - [`FlowError::StaleState`] if the stored status is no longer `expected`.
    /// - [`FlowError::LockedState`] if the entry has lost its encounter mid-consultation.
    pub fn perform(
        &self,
        entry_id: &EntryId,
        action: JourneyAction,
        expected: QueueStatus,
        actor: &Actor,
    ) -> FlowResult<JourneyOutcome> {
        let outcome = self.transact(|txn| {
            let entry = txn.state.queue.require(entry_id)?.clone();
            if entry.status.is_terminal() {
                return Err(FlowError::invalid_transition(
                    ENTRY,
                    entry_id,
                    entry.status,
                    action,
                ));
            }
            let next = action
                .target(expected)
                .ok_or_else(|| FlowError::invalid_transition(ENTRY, entry_id, expected, action))?;
            if entry.status != expected {
                return Err(FlowError::stale(ENTRY, entry_id, expected, entry.status));
            }

            let encounter = match action {
                JourneyAction::Call => linked_encounter(txn, &entry),
                JourneyAction::Start => Some(start_consultation(self, txn, &entry, actor)?),
                JourneyAction::SendToExam => Some(move_linked(
                    txn,
                    &entry,
                    EncounterStatus::AwaitingExam,
                    actor,
                )?),
                JourneyAction::ReturnFromExam | JourneyAction::Complete => {
                    let target = if action == JourneyAction::Complete {
                        EncounterStatus::Completed
                    } else {
                        EncounterStatus::ConsultationInProgress
                    };
                    Some(move_linked(txn, &entry, target, actor)?)
                }
                JourneyAction::NoShow | JourneyAction::Cancel => {
                    match linked_encounter(txn, &entry) {
                        Some(open) if !open.status.is_terminal() => Some(
                            txn.state
                                .encounters
                                .transition(
                                    &open.id,
                                    open.status,
                                    EncounterStatus::Cancelled,
                                    actor.id,
                                    txn.now,
                                )?
                                .clone(),
                        ),
                        other => other,
                    }
                }
            };

            let entry = txn
                .state
                .queue
                .compare_and_set(entry_id, expected, next, txn.now)?
                .clone();
            txn.emit(FlowEvent::JourneyAdvanced {
                action,
                from: expected,
                entry: entry.clone(),
                encounter: encounter.clone(),
                actor_id: actor.id,
            });
            Ok(JourneyOutcome {
                action,
                from: expected,
                entry,
                encounter,
            })
        });

        match &outcome {
            Ok(done) => tracing::info!(
                tenant = %self.tenant_id(),
                entry = %entry_id,
                actor = %actor.id,
                role = %actor.role,
                action = %action,
                from = %done.from,
                to = %done.entry.status,
                "journey action committed"
            ),
            Err(e) => tracing::debug!(
                tenant = %self.tenant_id(),
                entry = %entry_id,
                actor = %actor.id,
                action = %action,
                error = %e,
                "journey action rejected"
            ),
        }
        outcome
    }

    pub fn call(
        &self,
        entry_id: &EntryId,
        expected: QueueStatus,
        actor: &Actor,
    ) -> FlowResult<JourneyOutcome> {
        self.perform(entry_id, JourneyAction::Call, expected, actor)
    }

    pub fn start(
        &self,
        entry_id: &EntryId,
        expected: QueueStatus,
        actor: &Actor,
    ) -> FlowResult<JourneyOutcome> {
        self.perform(entry_id, JourneyAction::Start, expected, actor)
    }

    pub fn send_to_exam(
        &self,
        entry_id: &EntryId,
        expected: QueueStatus,
        actor: &Actor,
    ) -> FlowResult<JourneyOutcome> {
        self.perform(entry_id, JourneyAction::SendToExam, expected, actor)
    }

    pub fn return_from_exam(
        &self,
        entry_id: &EntryId,
        expected: QueueStatus,
        actor: &Actor,
    ) -> FlowResult<JourneyOutcome> {
        self.perform(entry_id, JourneyAction::ReturnFromExam, expected, actor)
    }

    pub fn complete(
        &self,
        entry_id: &EntryId,
        expected: QueueStatus,
        actor: &Actor,
    ) -> FlowResult<JourneyOutcome> {
        self.perform(entry_id, JourneyAction::Complete, expected, actor)
    }

    pub fn no_show(
        &self,
        entry_id: &EntryId,
        expected: QueueStatus,
        actor: &Actor,
    ) -> FlowResult<JourneyOutcome> {
        self.perform(entry_id, JourneyAction::NoShow, expected, actor)
    }

    pub fn cancel(
        &self,
        entry_id: &EntryId,
        expected: QueueStatus,
        actor: &Actor,
    ) -> FlowResult<JourneyOutcome> {
        self.perform(entry_id, JourneyAction::Cancel, expected, actor)
    }

    /// Entries whose linked encounter does not pair with them. Empty in a healthy tenant.
    pub fn inconsistent_pairings(&self) -> FlowResult<Vec<PairingViolation>> {
        self.read(|state| {
            state
                .queue
                .iter()
                .filter_map(|entry| {
                    let encounter_status = entry
                        .encounter_id
                        .and_then(|id| state.encounters.get(&id))
                        .map(|e| e.status);
                    (!pairing_is_consistent(entry.status, encounter_status)).then(|| {
                        PairingViolation {
                            entry_id: entry.id,
                            entry_status: entry.status,
                            encounter_status,
                        }
                    })
                })
                .collect()
        })
    }
}

fn linked_encounter(txn: &Txn<'_>, entry: &QueueEntry) -> Option<Encounter> {
    entry
        .encounter_id
        .and_then(|id| txn.state.encounters.get(&id))
        .cloned()
}

/// Move the entry's encounter to `target`; an entry past `called` must have one.
fn move_linked(
    txn: &mut Txn<'_>,
    entry: &QueueEntry,
    target: EncounterStatus,
    actor: &Actor,
) -> FlowResult<Encounter> {
    let encounter = linked_encounter(txn, entry).ok_or_else(|| {
        FlowError::LockedState(format!(
            "queue entry {} is {} but has no linked encounter",
            entry.id, entry.status
        ))
    })?;
    Ok(txn
        .state
        .encounters
        .transition(&encounter.id, encounter.status, target, actor.id, txn.now)?
        .clone())
}

/// Find or open the visit's encounter and walk it into consultation, recording each step.
fn start_consultation(
    flow: &TenantFlow,
    txn: &mut Txn<'_>,
    entry: &QueueEntry,
    actor: &Actor,
) -> FlowResult<Encounter> {
    let day = flow.config().practice_day(txn.now);
    let offset = flow.config().utc_offset();

    let existing = linked_encounter(txn, entry)
        .filter(|e| !e.status.is_terminal())
        .or_else(|| {
            txn.state
                .encounters
                .active_for_patient_on(&entry.patient_id, day, offset)
                .cloned()
        });

    let mut encounter = match existing {
        Some(encounter) => encounter,
        None => {
            let encounter = Encounter {
                id: EncounterId::new(),
                tenant_id: entry.tenant_id,
                patient_id: entry.patient_id,
                queue_entry_id: Some(entry.id),
                mode: EncounterMode::default(),
                status: EncounterStatus::Created,
                created_at: txn.now,
                started_at: None,
                closed_at: None,
                artifacts: Vec::new(),
                version: 1,
                updated_at: txn.now,
            };
            txn.state.encounters.insert(encounter.clone(), actor.id);
            encounter
        }
    };

    txn.state
        .encounters
        .link_entry(&encounter.id, entry.id, txn.now)?;
    txn.state
        .queue
        .link_encounter(&entry.id, encounter.id, txn.now)?;

    while encounter.status != EncounterStatus::ConsultationInProgress {
        let step = match encounter.status {
            EncounterStatus::Created => EncounterStatus::PreconsultInProgress,
            _ => EncounterStatus::ConsultationInProgress,
        };
        encounter = txn
            .state
            .encounters
            .transition(&encounter.id, encounter.status, step, actor.id, txn.now)?
            .clone();
    }
    Ok(encounter)
}
