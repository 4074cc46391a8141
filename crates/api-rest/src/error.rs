//! Mapping of core errors onto HTTP responses.

use api_shared::auth::AuthError;
use api_shared::ErrorRes;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use flow_core::{ErrorKind, FlowError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Flow(err) => status_for(err.kind()),
            ApiError::Unauthorized(AuthError::NotConfigured) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(AuthError::InvalidKey) => StatusCode::UNAUTHORIZED,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Flow(err) => err.kind().as_str(),
            ApiError::Unauthorized(_) => "unauthorized",
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StaleState => StatusCode::CONFLICT,
        ErrorKind::InvalidTransition | ErrorKind::InvalidState => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::LockedState => StatusCode::LOCKED,
        ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Corrupt => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        } else {
            tracing::debug!("request rejected: {self}");
        }

        let body = ErrorRes {
            error: self.kind().into(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_distinct_meaning() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::StaleState), StatusCode::CONFLICT);
        assert_eq!(
            status_for(ErrorKind::InvalidTransition),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(ErrorKind::InvalidState),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(ErrorKind::LockedState), StatusCode::LOCKED);
        assert_eq!(status_for(ErrorKind::Storage), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::Corrupt), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn storage_failures_are_service_unavailable() {
        let err = ApiError::from(FlowError::StorageUnavailable("disk gone".into()));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.kind(), "storage");
    }

    #[test]
    fn corrupt_state_is_an_internal_error() {
        let err = ApiError::from(FlowError::Corrupt("tenant state lock poisoned".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "corrupt");
    }
}
