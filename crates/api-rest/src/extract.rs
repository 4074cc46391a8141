//! Request extractors and the API key guard.

use crate::error::ApiError;
use crate::AppState;
use api_shared::auth::check_api_key;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use flow_core::{Actor, FlowError};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const API_KEY_HEADER: &str = "x-api-key";

/// The staff member making the request, from `x-actor-id` / `x-actor-role`.
#[derive(Debug, Clone, Copy)]
pub struct RequestActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(&parts.headers, ACTOR_ID_HEADER)?;
        let role = header(&parts.headers, ACTOR_ROLE_HEADER)?;
        Ok(Self(Actor::parse(id, role)?))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, FlowError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| FlowError::Validation(format!("{name} header is required")))
}

/// Rejects requests whose `x-api-key` does not match the configured key.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    check_api_key(state.api_key.as_deref(), provided)?;
    Ok(next.run(request).await)
}
