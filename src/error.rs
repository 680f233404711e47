use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    InvalidWindow {
        message: String,
        opens_at: chrono::DateTime<chrono::Utc>,
        closes_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("Maximum attempts exceeded: {existing} of {max_attempts} used")]
    MaxAttemptsExceeded { max_attempts: i32, existing: i64 },

    #[error("Attempt {attempt_id} was already submitted")]
    AlreadySubmitted {
        attempt_id: uuid::Uuid,
        status: String,
        score: Option<Decimal>,
    },

    #[error("Invalid state transition for {entity}: {from} -> {to}")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Cannot change {0} once attempts exist")]
    ImmutableAfterAttempts(String),

    #[error("Requested capacity {requested} is below committed participation {committed}")]
    CapacityBelowCommitted { requested: i32, committed: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Score {score} matches {matches} grade ranges")]
    AmbiguousGradeRange { score: Decimal, matches: usize },

    #[error("Score {score} matches no grade range")]
    NoMatchingGradeRange { score: Decimal },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Coarse error family reported to callers alongside the specific code.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BadRequest(_)
            | Error::Validation(_)
            | Error::Json(_)
            | Error::InvalidWindow { .. } => "validation_error",
            Error::MaxAttemptsExceeded { .. }
            | Error::AlreadySubmitted { .. }
            | Error::InvalidStateTransition { .. }
            | Error::ImmutableAfterAttempts(_)
            | Error::CapacityBelowCommitted { .. }
            | Error::Conflict(_) => "state_conflict",
            Error::AmbiguousGradeRange { .. } | Error::NoMatchingGradeRange { .. } => {
                "grade_lookup"
            }
            Error::Unauthorized(_) | Error::Forbidden(_) => "auth",
            Error::NotFound(_) => "not_found",
            Error::RateLimited => "rate_limit",
            _ => "internal",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::BadRequest(_) => "bad_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::RateLimited => "rate_limit_exceeded",
            Error::Database(_) => "database_error",
            Error::Validation(_) => "validation_error",
            Error::Json(_) => "invalid_json",
            Error::InvalidWindow { .. } => "outside_exam_window",
            Error::MaxAttemptsExceeded { .. } => "max_attempts_exceeded",
            Error::AlreadySubmitted { .. } => "already_submitted",
            Error::InvalidStateTransition { .. } => "invalid_state_transition",
            Error::ImmutableAfterAttempts(_) => "immutable_after_attempts",
            Error::CapacityBelowCommitted { .. } => "capacity_below_committed",
            Error::Conflict(_) => "conflict",
            Error::AmbiguousGradeRange { .. } => "ambiguous_grade_range",
            Error::NoMatchingGradeRange { .. } => "no_matching_grade_range",
            Error::Anyhow(_) | Error::Internal(_) => "internal_error",
        }
    }

    /// Current state attached to state conflicts so the caller can reconcile.
    fn state(&self) -> Option<JsonValue> {
        match self {
            Error::InvalidWindow {
                opens_at,
                closes_at,
                ..
            } => Some(json!({ "opens_at": opens_at, "closes_at": closes_at })),
            Error::MaxAttemptsExceeded {
                max_attempts,
                existing,
            } => Some(json!({ "max_attempts": max_attempts, "existing_attempts": existing })),
            Error::AlreadySubmitted {
                attempt_id,
                status,
                score,
            } => Some(json!({ "attempt_id": attempt_id, "status": status, "score": score })),
            Error::InvalidStateTransition { entity, from, to } => {
                Some(json!({ "entity": entity, "current_status": from, "requested_status": to }))
            }
            Error::CapacityBelowCommitted {
                requested,
                committed,
            } => Some(json!({ "requested": requested, "committed": committed })),
            Error::AmbiguousGradeRange { score, matches } => {
                Some(json!({ "score": score, "matches": matches }))
            }
            Error::NoMatchingGradeRange { score } => Some(json!({ "score": score })),
            _ => None,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_)
            | Error::Validation(_)
            | Error::Json(_)
            | Error::InvalidWindow { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Error::MaxAttemptsExceeded { .. }
            | Error::AlreadySubmitted { .. }
            | Error::InvalidStateTransition { .. }
            | Error::ImmutableAfterAttempts(_)
            | Error::CapacityBelowCommitted { .. }
            | Error::Conflict(_) => StatusCode::CONFLICT,
            Error::AmbiguousGradeRange { .. } | Error::NoMatchingGradeRange { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::Config(_)
            | Error::Database(_)
            | Error::Anyhow(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let message = match &self {
            Error::Database(err) => {
                tracing::error!(error = ?err, "database error");
                "An unexpected error occurred".to_string()
            }
            Error::Anyhow(err) => {
                tracing::error!(error = ?err, "unhandled error");
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "error": self.code(),
            "kind": self.kind(),
            "message": message,
        });
        if let Some(state) = self.state() {
            body["state"] = state;
        }
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                Error::Conflict(db_err.message().to_string())
            }
            other => Error::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_conflicts_map_to_409() {
        let err = Error::MaxAttemptsExceeded {
            max_attempts: 2,
            existing: 2,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.kind(), "state_conflict");
        assert_eq!(err.state().unwrap()["existing_attempts"], 2);
    }

    #[test]
    fn grade_lookup_errors_are_unprocessable() {
        let err = Error::NoMatchingGradeRange {
            score: Decimal::new(101, 0),
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "no_matching_grade_range");
    }

    #[test]
    fn window_errors_are_validation_errors() {
        let now = chrono::Utc::now();
        let err = Error::InvalidWindow {
            message: "Exam window has not opened yet".into(),
            opens_at: now,
            closes_at: now,
        };
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
