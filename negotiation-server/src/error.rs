//! Error types for the negotiation server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use negotiation_core::{NegotiationError, Rejection};

use crate::store::StoreError;

/// Startup errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced to HTTP callers. Every handler error ends up here.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not Found")]
    NotFound,

    #[error("Route Not Found")]
    RouteNotFound,

    #[error("Bad Request")]
    BadRequest(Vec<String>),

    #[error("Conflict")]
    Conflict(String),

    /// Detail is logged, never returned.
    #[error("Internal Server Error")]
    Internal(String),
}

impl From<NegotiationError> for ApiError {
    fn from(err: NegotiationError) -> Self {
        match err {
            NegotiationError::NotFound { .. } => ApiError::NotFound,
            NegotiationError::Rejected(Rejection::Absent { .. }) => ApiError::NotFound,
            NegotiationError::BadRequest { reasons } => ApiError::BadRequest(reasons),
            NegotiationError::Rejected(rejection) => {
                ApiError::BadRequest(vec![rejection.to_string()])
            }
            NegotiationError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            NegotiationError::Storage(_) | NegotiationError::Serialization(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound | ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match &self {
            ApiError::Internal(detail) => tracing::error!("Internal error: {}", detail),
            ApiError::Conflict(detail) => tracing::warn!("{}", detail),
            _ => {}
        }

        let reason = match &self {
            ApiError::BadRequest(reasons) => Some(reasons.clone()),
            _ => None,
        };

        let body = ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
            reason,
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
