//! JSON wire types.
//!
//! Identifiers travel as canonical 32-hex strings, statuses and modes as their `snake_case`
//! names and timestamps as RFC 3339 UTC strings with microsecond precision.

use chrono::{DateTime, SecondsFormat, Utc};
use flow_core::{
    legal_actions, ArtifactRef, Encounter, EncounterWithHistory, JourneyOutcome, QueueEntry,
    StatusHistoryEntry,
};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

pub fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    /// Machine-readable kind, e.g. `stale_state`.
    pub error: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueueEntryDto {
    pub id: String,
    pub tenant_id: String,
    pub patient_id: String,
    pub status: String,
    pub priority: u8,
    pub arrival_time: String,
    pub ready_at: Option<String>,
    pub manual_order: Option<i32>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub assigned_practitioner: Option<String>,
    pub encounter_id: Option<String>,
    pub version: u64,
    pub updated_at: String,
    /// Journey actions a viewer may offer for the current status.
    pub legal_actions: Vec<String>,
}

impl From<&QueueEntry> for QueueEntryDto {
    fn from(entry: &QueueEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            tenant_id: entry.tenant_id.to_string(),
            patient_id: entry.patient_id.to_string(),
            status: entry.status.to_string(),
            priority: entry.priority.value(),
            arrival_time: timestamp(&entry.arrival_time),
            ready_at: entry.ready_at.as_ref().map(timestamp),
            manual_order: entry.manual_order,
            reason: entry.reason.clone(),
            notes: entry.notes.clone(),
            assigned_practitioner: entry.assigned_practitioner.map(|a| a.to_string()),
            encounter_id: entry.encounter_id.map(|e| e.to_string()),
            version: entry.version,
            updated_at: timestamp(&entry.updated_at),
            legal_actions: legal_actions(entry.status)
                .into_iter()
                .map(|a| a.to_string())
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateEntryReq {
    pub patient_id: String,
    /// 1 (most urgent) to 4 (deferred); defaults to 3.
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Partial update. An absent field is left alone; `null` clears it.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateEntryReq {
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub reason: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<i32>)]
    pub manual_order: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub assigned_practitioner: Option<Option<String>>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListEntriesRes {
    pub entries: Vec<QueueEntryDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueRes {
    /// Pending entries in queue order.
    pub entries: Vec<QueueEntryDto>,
    /// Sequence of the last event reflected in `entries`; pass as `Last-Event-ID` to resume.
    pub last_sequence: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ReorderReq {
    pub entry_ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ActionReq {
    /// The entry status the caller last saw.
    pub expected_status: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ArtifactDto {
    pub kind: String,
    pub reference: String,
    pub attached_at: String,
    pub attached_by: String,
}

impl From<&ArtifactRef> for ArtifactDto {
    fn from(artifact: &ArtifactRef) -> Self {
        Self {
            kind: artifact.kind.as_str().into(),
            reference: artifact.reference.to_string(),
            attached_at: timestamp(&artifact.attached_at),
            attached_by: artifact.attached_by.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EncounterDto {
    pub id: String,
    pub tenant_id: String,
    pub patient_id: String,
    pub queue_entry_id: Option<String>,
    pub mode: String,
    pub status: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub closed_at: Option<String>,
    pub artifacts: Vec<ArtifactDto>,
    pub version: u64,
    pub updated_at: String,
}

impl From<&Encounter> for EncounterDto {
    fn from(encounter: &Encounter) -> Self {
        Self {
            id: encounter.id.to_string(),
            tenant_id: encounter.tenant_id.to_string(),
            patient_id: encounter.patient_id.to_string(),
            queue_entry_id: encounter.queue_entry_id.map(|e| e.to_string()),
            mode: encounter.mode.to_string(),
            status: encounter.status.to_string(),
            created_at: timestamp(&encounter.created_at),
            started_at: encounter.started_at.as_ref().map(timestamp),
            closed_at: encounter.closed_at.as_ref().map(timestamp),
            artifacts: encounter.artifacts.iter().map(ArtifactDto::from).collect(),
            version: encounter.version,
            updated_at: timestamp(&encounter.updated_at),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusHistoryDto {
    pub status: String,
    pub at: String,
    pub actor_id: String,
}

impl From<&StatusHistoryEntry> for StatusHistoryDto {
    fn from(row: &StatusHistoryEntry) -> Self {
        Self {
            status: row.status.to_string(),
            at: timestamp(&row.at),
            actor_id: row.actor_id.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EncounterRes {
    pub encounter: EncounterDto,
    pub history: Vec<StatusHistoryDto>,
}

impl From<&EncounterWithHistory> for EncounterRes {
    fn from(record: &EncounterWithHistory) -> Self {
        Self {
            encounter: EncounterDto::from(&record.encounter),
            history: record.history.iter().map(StatusHistoryDto::from).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateEncounterReq {
    pub patient_id: String,
    /// `solo` (default) or `team`.
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub queue_entry_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateEncounterStatusReq {
    pub expected_status: String,
    pub status: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateEncounterModeReq {
    pub mode: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AttachArtifactReq {
    /// `clinical_text` or `ocr_result`.
    pub kind: String,
    pub reference: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JourneyOutcomeRes {
    pub action: String,
    pub from: String,
    pub entry: QueueEntryDto,
    pub encounter: Option<EncounterDto>,
}

impl From<&JourneyOutcome> for JourneyOutcomeRes {
    fn from(outcome: &JourneyOutcome) -> Self {
        Self {
            action: outcome.action.to_string(),
            from: outcome.from.to_string(),
            entry: QueueEntryDto::from(&outcome.entry),
            encounter: outcome.encounter.as_ref().map(EncounterDto::from),
        }
    }
}
