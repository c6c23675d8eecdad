use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rusqlite::ErrorCode;

use crate::models::AppointmentStatus;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("appointment is {status} and can no longer be rescheduled")]
    NotReschedulable { status: AppointmentStatus },

    #[error("appointment cannot be cancelled: {reason}")]
    NotCancellable {
        status: AppointmentStatus,
        reason: String,
    },

    #[error("cannot move appointment from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("a deposit must be captured before this appointment can be confirmed")]
    DepositRequired,

    #[error("timed out waiting for the booking store")]
    Timeout,

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl AppError {
    /// Storage failures worth one more attempt: SQLite reported the database busy or locked.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Database(rusqlite::Error::SqliteFailure(e, _)) => {
                matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database",
            AppError::Config(_) => "config",
            AppError::NotFound(_) => "not_found",
            AppError::SlotUnavailable(_) => "slot_unavailable",
            AppError::NotReschedulable { .. } => "not_reschedulable",
            AppError::NotCancellable { .. } => "not_cancellable",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::DepositRequired => "deposit_required",
            AppError::Timeout => "timeout",
            AppError::Invalid(_) => "invalid",
            AppError::Unauthorized => "unauthorized",
        }
    }

    fn current_status(&self) -> Option<AppointmentStatus> {
        match self {
            AppError::NotReschedulable { status } | AppError::NotCancellable { status, .. } => {
                Some(*status)
            }
            AppError::InvalidTransition { from, .. } => Some(*from),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SlotUnavailable(_) => StatusCode::CONFLICT,
            AppError::NotReschedulable { .. } => StatusCode::CONFLICT,
            AppError::NotCancellable { .. } => StatusCode::CONFLICT,
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::DepositRequired => StatusCode::PAYMENT_REQUIRED,
            AppError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Invalid(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let mut body = serde_json::json!({ "error": self.to_string(), "kind": self.kind() });
        if let Some(current) = self.current_status() {
            body["status"] = serde_json::json!(current.as_str());
        }
        (status, axum::Json(body)).into_response()
    }
}
