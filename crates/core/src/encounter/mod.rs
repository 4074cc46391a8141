//! Encounters: the clinical episode generated by a visit.
//!
//! An encounter walks `created → preconsult_in_progress → consultation_in_progress`, may detour
//! to `awaiting_exam` and back, and ends `completed` or `cancelled`. Every status it enters is
//! appended to its [`StatusHistoryEntry`] list, which is never edited.

mod service;
mod store;

pub use store::EncounterStore;

use chrono::{DateTime, Utc};
use flow_types::NonEmptyText;
use flow_uuid::{ActorId, EncounterId, EntryId, PatientId, TenantId};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::FlowError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterStatus {
    Created,
    PreconsultInProgress,
    ConsultationInProgress,
    AwaitingExam,
    Completed,
    Cancelled,
}

impl EncounterStatus {
    pub const ALL: [EncounterStatus; 6] = [
        EncounterStatus::Created,
        EncounterStatus::PreconsultInProgress,
        EncounterStatus::ConsultationInProgress,
        EncounterStatus::AwaitingExam,
        EncounterStatus::Completed,
        EncounterStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, EncounterStatus::Completed | EncounterStatus::Cancelled)
    }

    /// Mode may only change before the consultation starts.
    pub fn mode_is_editable(&self) -> bool {
        matches!(
            self,
            EncounterStatus::Created | EncounterStatus::PreconsultInProgress
        )
    }

    /// Whether `next` is reachable from this status in one step.
    pub fn can_transition_to(&self, next: EncounterStatus) -> bool {
        use EncounterStatus::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Cancelled)
                | (Created, PreconsultInProgress)
                | (PreconsultInProgress, ConsultationInProgress)
                | (ConsultationInProgress, AwaitingExam)
                | (ConsultationInProgress, Completed)
                | (AwaitingExam, ConsultationInProgress)
                | (AwaitingExam, Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EncounterStatus::Created => "created",
            EncounterStatus::PreconsultInProgress => "preconsult_in_progress",
            EncounterStatus::ConsultationInProgress => "consultation_in_progress",
            EncounterStatus::AwaitingExam => "awaiting_exam",
            EncounterStatus::Completed => "completed",
            EncounterStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EncounterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncounterStatus {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EncounterStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| FlowError::Validation(format!("unknown encounter status '{s}'")))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterMode {
    #[default]
    Solo,
    Team,
}

impl EncounterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncounterMode::Solo => "solo",
            EncounterMode::Team => "team",
        }
    }
}

impl fmt::Display for EncounterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncounterMode {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "solo" => Ok(EncounterMode::Solo),
            "team" => Ok(EncounterMode::Team),
            other => Err(FlowError::Validation(format!(
                "unknown encounter mode '{other}'"
            ))),
        }
    }
}

/// What an artifact reference points at. The content itself lives elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ClinicalText,
    OcrResult,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::ClinicalText => "clinical_text",
            ArtifactKind::OcrResult => "ocr_result",
        }
    }
}

impl FromStr for ArtifactKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "clinical_text" => Ok(ArtifactKind::ClinicalText),
            "ocr_result" => Ok(ArtifactKind::OcrResult),
            other => Err(FlowError::Validation(format!(
                "unknown artifact kind '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub reference: NonEmptyText,
    pub attached_at: DateTime<Utc>,
    pub attached_by: ActorId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: EncounterId,
    pub tenant_id: TenantId,
    pub patient_id: PatientId,
    pub queue_entry_id: Option<EntryId>,
    pub mode: EncounterMode,
    pub status: EncounterStatus,
    pub created_at: DateTime<Utc>,
    /// First time the consultation started.
    pub started_at: Option<DateTime<Utc>>,
    /// Set once the encounter reaches a terminal status.
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// One append-only status history row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub encounter_id: EncounterId,
    pub status: EncounterStatus,
    pub at: DateTime<Utc>,
    pub actor_id: ActorId,
}

/// An encounter together with its full status history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterWithHistory {
    pub encounter: Encounter,
    pub history: Vec<StatusHistoryEntry>,
}
