//! # API REST
//!
//! REST API implementation for the patient flow engine.
//!
//! Handles:
//! - HTTP endpoints with axum, one tenant per path prefix
//! - Server-sent events for live queue updates
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, API key, actor headers)
//!
//! Uses `api-shared` for wire types and utilities.

#![warn(rust_2018_idioms)]

pub mod bootstrap;
pub mod error;
pub mod events;
pub mod extract;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use flow_core::FlowRegistry;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::ApiError;

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FlowRegistry>,
    /// Expected `x-api-key`; `None` refuses every protected request.
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(registry: Arc<FlowRegistry>, api_key: Option<String>) -> Self {
        Self {
            registry,
            api_key: api_key.map(Arc::from),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::list_entries,
        handlers::add_entry,
        handlers::get_entry,
        handlers::update_entry,
        handlers::perform_action,
        handlers::ordered_queue,
        handlers::reorder_queue,
        handlers::create_encounter,
        handlers::get_encounter,
        handlers::update_encounter_status,
        handlers::update_encounter_mode,
        handlers::attach_artifact,
        events::events,
    ),
    components(schemas(
        api_shared::HealthRes,
        api_shared::ErrorRes,
        api_shared::QueueEntryDto,
        api_shared::CreateEntryReq,
        api_shared::UpdateEntryReq,
        api_shared::ListEntriesRes,
        api_shared::QueueRes,
        api_shared::ReorderReq,
        api_shared::ActionReq,
        api_shared::JourneyOutcomeRes,
        api_shared::ArtifactDto,
        api_shared::EncounterDto,
        api_shared::StatusHistoryDto,
        api_shared::EncounterRes,
        api_shared::CreateEncounterReq,
        api_shared::UpdateEncounterStatusReq,
        api_shared::UpdateEncounterModeReq,
        api_shared::AttachArtifactReq,
    ))
)]
pub struct ApiDoc;

/// Build the full router. `/health` and the docs are open; tenant routes need the API key.
pub fn router(state: AppState) -> Router {
    let tenant_routes = Router::new()
        .route(
            "/tenants/:tenant/entries",
            get(handlers::list_entries).post(handlers::add_entry),
        )
        .route(
            "/tenants/:tenant/entries/:id",
            get(handlers::get_entry).patch(handlers::update_entry),
        )
        .route(
            "/tenants/:tenant/entries/:id/actions/:action",
            post(handlers::perform_action),
        )
        .route(
            "/tenants/:tenant/queue",
            get(handlers::ordered_queue).put(handlers::reorder_queue),
        )
        .route("/tenants/:tenant/encounters", post(handlers::create_encounter))
        .route("/tenants/:tenant/encounters/:id", get(handlers::get_encounter))
        .route(
            "/tenants/:tenant/encounters/:id/status",
            put(handlers::update_encounter_status),
        )
        .route(
            "/tenants/:tenant/encounters/:id/mode",
            put(handlers::update_encounter_mode),
        )
        .route(
            "/tenants/:tenant/encounters/:id/artifacts",
            post(handlers::attach_artifact),
        )
        .route("/tenants/:tenant/events", get(events::events))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            extract::require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(tenant_routes)
        .merge(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests;
