use std::collections::BTreeMap;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::delivery::DeliveryStatus;

pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} field is required")]
    MissingField(&'static str),

    #[error("invalid request fields")]
    InvalidFields(FieldErrors),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("User is not an admin")]
    ForbiddenAssignee,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("delivery is locked by another update, retry shortly")]
    LockTimeout,

    #[error("Cannot update delivery in {0} state. This is a terminal state.")]
    TerminalState(DeliveryStatus),

    #[error("Invalid transition from {from} to {to}. Valid transitions: {}", render_states(.valid))]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
        valid: &'static [DeliveryStatus],
    },

    #[error("Invalid transition from {from} to {to}. Valid transitions: {}", render_states(.valid))]
    UnknownTarget {
        from: DeliveryStatus,
        to: String,
        valid: &'static [DeliveryStatus],
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::MissingField(_)
            | AppError::InvalidFields(_)
            | AppError::TerminalState(_)
            | AppError::InvalidTransition { .. }
            | AppError::UnknownTarget { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::ForbiddenAssignee => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::LockTimeout => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::LockTimeout)
    }
}

pub(crate) fn render_states(states: &[DeliveryStatus]) -> String {
    if states.is_empty() {
        return "None".to_string();
    }

    states
        .iter()
        .map(|status| status.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = match &self {
            AppError::InvalidFields(fields) => json!({
                "error": self.to_string(),
                "fields": fields,
            }),
            _ => json!({
                "error": self.to_string(),
            }),
        };

        if self.is_retryable() {
            return (status, [(header::RETRY_AFTER, "1")], Json(body)).into_response();
        }

        (status, Json(body)).into_response()
    }
}
