use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("{0}")]
    BadRequest(String),
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("end mileage {end} must be greater than start mileage {start}")]
    InvalidMileage { start: Decimal, end: Decimal },
    #[error("a trip is already in progress")]
    TripAlreadyInProgress,
    #[error("no trip in progress")]
    NoActiveTrip,
    #[error("inconsistent state: {0}")]
    InconsistentState(String),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Stable machine-readable name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::Database(_)
            | AppError::Other(_) => "internal",
            AppError::Validation { .. } => "validation_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotAuthenticated => "not_authenticated",
            AppError::Forbidden => "forbidden",
            AppError::NotFound => "not_found",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::InvalidMileage { .. } => "invalid_mileage",
            AppError::TripAlreadyInProgress => "trip_already_in_progress",
            AppError::NoActiveTrip => "no_active_trip",
            AppError::InconsistentState(_) => "inconsistent_state",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::Database(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation { .. } | AppError::InvalidMileage { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::InvalidTransition(_)
            | AppError::TripAlreadyInProgress
            | AppError::NoActiveTrip
            | AppError::InconsistentState(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the log, not in the response body.
        let message = if status.is_server_error() {
            error!("request failed: {self:?}");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "kind": self.kind(), "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_errors_map_to_conflict() {
        for err in [
            AppError::TripAlreadyInProgress,
            AppError::NoActiveTrip,
            AppError::InvalidTransition("already completed".into()),
            AppError::InconsistentState("two trips".into()),
        ] {
            assert_eq!(err.status(), StatusCode::CONFLICT, "{}", err.kind());
        }
    }

    #[test]
    fn validation_message_names_the_field() {
        let err = AppError::validation("purpose", "must be Business or Personal");
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.to_string(), "purpose: must be Business or Personal");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
