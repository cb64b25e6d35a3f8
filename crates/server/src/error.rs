//! Application error handling

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fhir_graph_core::{FetchFailure, IssueType, OperationOutcome, ResolveError};

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// The upstream FHIR server failed or sent something unusable
    BadGateway(IssueType, String),
    GatewayTimeout(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, outcome) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, OperationOutcome::not_found(&msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, OperationOutcome::invalid(&msg)),
            AppError::BadGateway(code, msg) => {
                (StatusCode::BAD_GATEWAY, OperationOutcome::error(code, &msg))
            }
            AppError::GatewayTimeout(msg) => (
                StatusCode::GATEWAY_TIMEOUT,
                OperationOutcome::error(IssueType::Timeout, &msg),
            ),
        };

        (status, Json(outcome)).into_response()
    }
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        match &err {
            ResolveError::Fetch(e) if e.cause == FetchFailure::Timeout => {
                AppError::GatewayTimeout(err.to_string())
            }
            ResolveError::Fetch(e) if e.is_transient() => {
                AppError::BadGateway(IssueType::Transient, err.to_string())
            }
            ResolveError::Fetch(_) => AppError::BadGateway(IssueType::Exception, err.to_string()),
            ResolveError::Shape(_) => AppError::BadGateway(IssueType::Structure, err.to_string()),
        }
    }
}
