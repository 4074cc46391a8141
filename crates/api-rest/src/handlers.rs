//! Route handlers.

use crate::error::ApiError;
use crate::extract::RequestActor;
use crate::AppState;
use api_shared::{
    ActionReq, AttachArtifactReq, CreateEncounterReq, CreateEntryReq, EncounterDto, EncounterRes,
    ErrorRes, HealthRes, HealthService, JourneyOutcomeRes, ListEntriesRes, QueueEntryDto,
    QueueRes, ReorderReq, UpdateEncounterModeReq, UpdateEncounterStatusReq, UpdateEntryReq,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use flow_core::{
    ActorId, ArtifactKind, Change, EncounterId, EncounterMode, EncounterStatus, EntryFilter,
    EntryId, EntryPatch, FlowError, FlowResult, JourneyAction, NewEntry, PatientId, Priority,
    QueueStatus, TenantFlow, TenantId,
};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use utoipa::IntoParams;

pub(crate) fn tenant_flow(state: &AppState, raw: &str) -> Result<Arc<TenantFlow>, ApiError> {
    let tenant_id = TenantId::parse(raw).map_err(FlowError::from)?;
    Ok(state.registry.tenant(&tenant_id)?)
}

fn parse_id<T>(raw: &str) -> FlowResult<T>
where
    T: FromStr,
    FlowError: From<T::Err>,
{
    Ok(raw.trim().parse::<T>()?)
}

fn parse_priority(raw: Option<i64>) -> FlowResult<Option<Priority>> {
    raw.map(Priority::new).transpose().map_err(FlowError::from)
}

fn parse_time(field: &str, raw: &str) -> FlowResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| FlowError::Validation(format!("{field} must be an RFC 3339 timestamp: {e}")))
}

fn change<T>(value: Option<Option<T>>) -> Change<T> {
    match value {
        None => Change::Keep,
        Some(None) => Change::Clear,
        Some(Some(value)) => Change::Set(value),
    }
}

fn entries(list: &[flow_core::QueueEntry]) -> Vec<QueueEntryDto> {
    list.iter().map(QueueEntryDto::from).collect()
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint; does not require an API key.
pub async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

/// Filters for listing queue entries.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListEntriesQuery {
    /// Comma-separated statuses, e.g. `waiting,called`.
    pub status: Option<String>,
    pub priority: Option<i64>,
    /// Arrived at or after this RFC 3339 timestamp.
    pub from: Option<String>,
    /// Arrived before this RFC 3339 timestamp.
    pub to: Option<String>,
}

impl ListEntriesQuery {
    fn into_filter(self) -> FlowResult<EntryFilter> {
        let statuses = match self.status.as_deref() {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse::<QueueStatus>)
                .collect::<FlowResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(EntryFilter {
            statuses,
            priority: parse_priority(self.priority)?,
            arrived_from: self.from.as_deref().map(|r| parse_time("from", r)).transpose()?,
            arrived_until: self.to.as_deref().map(|r| parse_time("to", r)).transpose()?,
        })
    }
}

#[utoipa::path(
    get,
    path = "/tenants/{tenant}/entries",
    params(("tenant" = String, Path, description = "Tenant id"), ListEntriesQuery),
    responses(
        (status = 200, description = "Matching queue entries", body = ListEntriesRes),
        (status = 400, description = "Bad filter", body = ErrorRes),
        (status = 404, description = "Unknown tenant", body = ErrorRes)
    )
)]
pub async fn list_entries(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<ListEntriesQuery>,
) -> Result<Json<ListEntriesRes>, ApiError> {
    let flow = tenant_flow(&state, &tenant)?;
    let filter = query.into_filter()?;
    let list = flow.list_entries(&filter)?;
    Ok(Json(ListEntriesRes {
        entries: entries(&list),
    }))
}

#[utoipa::path(
    post,
    path = "/tenants/{tenant}/entries",
    params(("tenant" = String, Path, description = "Tenant id")),
    request_body = CreateEntryReq,
    responses(
        (status = 201, description = "Patient arrived", body = QueueEntryDto),
        (status = 400, description = "Unknown patient or duplicate arrival", body = ErrorRes)
    )
)]
pub async fn add_entry(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    RequestActor(actor): RequestActor,
    Json(req): Json<CreateEntryReq>,
) -> Result<(StatusCode, Json<QueueEntryDto>), ApiError> {
    let flow = tenant_flow(&state, &tenant)?;
    let new = NewEntry {
        patient_id: parse_id::<PatientId>(&req.patient_id)?,
        priority: parse_priority(req.priority)?.unwrap_or_default(),
        reason: req.reason,
    };
    let entry = flow.add_entry(new, &actor)?;
    Ok((StatusCode::CREATED, Json(QueueEntryDto::from(&entry))))
}

#[utoipa::path(
    get,
    path = "/tenants/{tenant}/entries/{id}",
    params(
        ("tenant" = String, Path, description = "Tenant id"),
        ("id" = String, Path, description = "Queue entry id")
    ),
    responses(
        (status = 200, description = "Queue entry", body = QueueEntryDto),
        (status = 404, description = "Not found", body = ErrorRes)
    )
)]
pub async fn get_entry(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
) -> Result<Json<QueueEntryDto>, ApiError> {
    let flow = tenant_flow(&state, &tenant)?;
    let entry = flow.get_entry(&parse_id::<EntryId>(&id)?)?;
    Ok(Json(QueueEntryDto::from(&entry)))
}

#[utoipa::path(
    patch,
    path = "/tenants/{tenant}/entries/{id}",
    params(
        ("tenant" = String, Path, description = "Tenant id"),
        ("id" = String, Path, description = "Queue entry id")
    ),
    request_body = UpdateEntryReq,
    responses(
        (status = 200, description = "Updated entry", body = QueueEntryDto),
        (status = 409, description = "Version mismatch", body = ErrorRes),
        (status = 422, description = "Entry is terminal", body = ErrorRes)
    )
)]
pub async fn update_entry(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    RequestActor(actor): RequestActor,
    Json(req): Json<UpdateEntryReq>,
) -> Result<Json<QueueEntryDto>, ApiError> {
    let flow = tenant_flow(&state, &tenant)?;
    let assigned = match req.assigned_practitioner {
        Some(Some(raw)) => Some(Some(parse_id::<ActorId>(&raw)?)),
        Some(None) => Some(None),
        None => None,
    };
    let patch = EntryPatch {
        priority: parse_priority(req.priority)?,
        notes: change(req.notes),
        reason: change(req.reason),
        manual_order: change(req.manual_order),
        assigned_practitioner: change(assigned),
        expected_version: req.expected_version,
    };
    let entry = flow.update_entry(&parse_id::<EntryId>(&id)?, patch, &actor)?;
    Ok(Json(QueueEntryDto::from(&entry)))
}

#[utoipa::path(
    post,
    path = "/tenants/{tenant}/entries/{id}/actions/{action}",
    params(
        ("tenant" = String, Path, description = "Tenant id"),
        ("id" = String, Path, description = "Queue entry id"),
        ("action" = String, Path, description = "call, start, send_to_exam, return_from_exam, complete, no_show or cancel")
    ),
    request_body = ActionReq,
    responses(
        (status = 200, description = "Action committed", body = JourneyOutcomeRes),
        (status = 409, description = "Another user changed the entry first", body = ErrorRes),
        (status = 422, description = "Action not allowed from the expected status", body = ErrorRes)
    )
)]
pub async fn perform_action(
    State(state): State<AppState>,
    Path((tenant, id, action)): Path<(String, String, String)>,
    RequestActor(actor): RequestActor,
    Json(req): Json<ActionReq>,
) -> Result<Json<JourneyOutcomeRes>, ApiError> {
    let flow = tenant_flow(&state, &tenant)?;
    let action: JourneyAction = action.parse()?;
    let expected: QueueStatus = req.expected_status.parse()?;
    let outcome = flow.perform(&parse_id::<EntryId>(&id)?, action, expected, &actor)?;
    Ok(Json(JourneyOutcomeRes::from(&outcome)))
}

#[utoipa::path(
    get,
    path = "/tenants/{tenant}/queue",
    params(("tenant" = String, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Pending entries in queue order", body = QueueRes)
    )
)]
pub async fn ordered_queue(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<QueueRes>, ApiError> {
    let flow = tenant_flow(&state, &tenant)?;
    let (ordered, last_sequence) = flow.read_at_sequence(|tenant_state| {
        flow_core::ordering::order_queue(tenant_state.queue.iter())
            .into_iter()
            .map(QueueEntryDto::from)
            .collect::<Vec<_>>()
    })?;
    Ok(Json(QueueRes {
        entries: ordered,
        last_sequence,
    }))
}

#[utoipa::path(
    put,
    path = "/tenants/{tenant}/queue",
    params(("tenant" = String, Path, description = "Tenant id")),
    request_body = ReorderReq,
    responses(
        (status = 200, description = "Queue after reorder", body = QueueRes),
        (status = 422, description = "A listed entry is no longer waiting", body = ErrorRes)
    )
)]
pub async fn reorder_queue(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    RequestActor(actor): RequestActor,
    Json(req): Json<ReorderReq>,
) -> Result<Json<QueueRes>, ApiError> {
    let flow = tenant_flow(&state, &tenant)?;
    let ordered = if req.entry_ids.is_empty() {
        flow.clear_manual_order(&actor)?
    } else {
        let ids = req
            .entry_ids
            .iter()
            .map(|raw| parse_id::<EntryId>(raw))
            .collect::<FlowResult<Vec<_>>>()?;
        flow.reorder(&ids, &actor)?
    };
    Ok(Json(QueueRes {
        entries: entries(&ordered),
        last_sequence: flow.events().last_sequence(),
    }))
}

#[utoipa::path(
    post,
    path = "/tenants/{tenant}/encounters",
    params(("tenant" = String, Path, description = "Tenant id")),
    request_body = CreateEncounterReq,
    responses(
        (status = 200, description = "Today's open encounter for the patient", body = EncounterDto),
        (status = 400, description = "Unknown patient or mismatched entry", body = ErrorRes)
    )
)]
pub async fn create_encounter(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    RequestActor(actor): RequestActor,
    Json(req): Json<CreateEncounterReq>,
) -> Result<Json<EncounterDto>, ApiError> {
    let flow = tenant_flow(&state, &tenant)?;
    let mode = match req.mode.as_deref() {
        Some(raw) => raw.parse::<EncounterMode>()?,
        None => EncounterMode::default(),
    };
    let entry_id = req
        .queue_entry_id
        .as_deref()
        .map(parse_id::<EntryId>)
        .transpose()?;
    let encounter =
        flow.create_encounter(parse_id::<PatientId>(&req.patient_id)?, mode, entry_id, &actor)?;
    Ok(Json(EncounterDto::from(&encounter)))
}

#[utoipa::path(
    get,
    path = "/tenants/{tenant}/encounters/{id}",
    params(
        ("tenant" = String, Path, description = "Tenant id"),
        ("id" = String, Path, description = "Encounter id")
    ),
    responses(
        (status = 200, description = "Encounter with status history", body = EncounterRes),
        (status = 404, description = "Not found", body = ErrorRes)
    )
)]
pub async fn get_encounter(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
) -> Result<Json<EncounterRes>, ApiError> {
    let flow = tenant_flow(&state, &tenant)?;
    let record = flow.get_encounter(&parse_id::<EncounterId>(&id)?)?;
    Ok(Json(EncounterRes::from(&record)))
}

#[utoipa::path(
    put,
    path = "/tenants/{tenant}/encounters/{id}/status",
    params(
        ("tenant" = String, Path, description = "Tenant id"),
        ("id" = String, Path, description = "Encounter id")
    ),
    request_body = UpdateEncounterStatusReq,
    responses(
        (status = 200, description = "Updated encounter", body = EncounterDto),
        (status = 409, description = "Status changed meanwhile", body = ErrorRes),
        (status = 422, description = "Status not reachable", body = ErrorRes),
        (status = 423, description = "Must go through the queue action", body = ErrorRes)
    )
)]
pub async fn update_encounter_status(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    RequestActor(actor): RequestActor,
    Json(req): Json<UpdateEncounterStatusReq>,
) -> Result<Json<EncounterDto>, ApiError> {
    let flow = tenant_flow(&state, &tenant)?;
    let expected: EncounterStatus = req.expected_status.parse()?;
    let next: EncounterStatus = req.status.parse()?;
    let encounter =
        flow.update_encounter_status(&parse_id::<EncounterId>(&id)?, expected, next, &actor)?;
    Ok(Json(EncounterDto::from(&encounter)))
}

#[utoipa::path(
    put,
    path = "/tenants/{tenant}/encounters/{id}/mode",
    params(
        ("tenant" = String, Path, description = "Tenant id"),
        ("id" = String, Path, description = "Encounter id")
    ),
    request_body = UpdateEncounterModeReq,
    responses(
        (status = 200, description = "Updated encounter", body = EncounterDto),
        (status = 423, description = "Consultation already started", body = ErrorRes)
    )
)]
pub async fn update_encounter_mode(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    RequestActor(actor): RequestActor,
    Json(req): Json<UpdateEncounterModeReq>,
) -> Result<Json<EncounterDto>, ApiError> {
    let flow = tenant_flow(&state, &tenant)?;
    let mode: EncounterMode = req.mode.parse()?;
    let encounter = flow.update_encounter_mode(&parse_id::<EncounterId>(&id)?, mode, &actor)?;
    Ok(Json(EncounterDto::from(&encounter)))
}

#[utoipa::path(
    post,
    path = "/tenants/{tenant}/encounters/{id}/artifacts",
    params(
        ("tenant" = String, Path, description = "Tenant id"),
        ("id" = String, Path, description = "Encounter id")
    ),
    request_body = AttachArtifactReq,
    responses(
        (status = 201, description = "Artifact reference stored", body = EncounterDto),
        (status = 422, description = "Encounter was cancelled", body = ErrorRes)
    )
)]
pub async fn attach_artifact(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    RequestActor(actor): RequestActor,
    Json(req): Json<AttachArtifactReq>,
) -> Result<(StatusCode, Json<EncounterDto>), ApiError> {
    let flow = tenant_flow(&state, &tenant)?;
    let kind: ArtifactKind = req.kind.parse()?;
    let encounter =
        flow.attach_artifact(&parse_id::<EncounterId>(&id)?, kind, &req.reference, &actor)?;
    Ok((StatusCode::CREATED, Json(EncounterDto::from(&encounter))))
}
