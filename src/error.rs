use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::order::OrderStatus;

/// Coarse classification of a [`DispatchError`], one per HTTP-equivalent outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid tracking id: {0:?}")]
    InvalidTrackingId(String),

    #[error("actor {0} is not a driver")]
    NotADriver(uuid::Uuid),

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("driver {0} not found")]
    DriverNotFound(uuid::Uuid),

    #[error("recipient {0} not found")]
    RecipientNotFound(uuid::Uuid),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("stale location report")]
    StaleLocation,

    #[error("tracking id generation exhausted after {attempts} attempts")]
    TrackingIdExhausted { attempts: u32 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Validation(_)
            | DispatchError::InvalidTrackingId(_)
            | DispatchError::NotADriver(_) => ErrorKind::Validation,
            DispatchError::Forbidden => ErrorKind::Authorization,
            DispatchError::NotFound(_)
            | DispatchError::DriverNotFound(_)
            | DispatchError::RecipientNotFound(_) => ErrorKind::NotFound,
            DispatchError::InvalidTransition { .. }
            | DispatchError::Conflict(_)
            | DispatchError::StaleLocation => ErrorKind::Conflict,
            DispatchError::TrackingIdExhausted { .. } | DispatchError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Short label used for metric outcomes.
    pub fn outcome(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "invalid",
            ErrorKind::Authorization => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "error",
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{DispatchError, ErrorKind};
    use crate::models::order::OrderStatus;

    #[test]
    fn not_a_driver_is_a_validation_error() {
        let err = DispatchError::NotADriver(Uuid::nil());
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn invalid_transition_is_a_conflict() {
        let err = DispatchError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::InProgress,
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "invalid transition from DELIVERED to IN_PROGRESS");
    }

    #[test]
    fn forbidden_message_carries_no_detail() {
        assert_eq!(DispatchError::Forbidden.to_string(), "forbidden");
    }
}
