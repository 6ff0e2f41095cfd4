//! # Error Handling
//!
//! This module provides unified error handling for the Cogni Scheduler API:
//! a tagged domain error type (`SchedulerError`) for the scheduler core, and
//! a problem+json response format with trace ID propagation at the HTTP
//! boundary. Callers discriminate on the variant, never on message text.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::schedule_run::RunStatus;
use crate::telemetry;

/// Domain errors raised by the scheduler core.
///
/// Every variant carries enough context to act on without parsing the
/// rendered message.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expression}': {detail}")]
    InvalidCronExpression { expression: String, detail: String },

    #[error("unrecognized IANA timezone '{timezone}'")]
    InvalidTimezone { timezone: String },

    #[error("schedule {schedule_id} not found")]
    ScheduleNotFound { schedule_id: Uuid },

    #[error("caller does not own schedule {schedule_id}")]
    ScheduleAccessDenied { schedule_id: Uuid },

    #[error("execution grant {grant_id} not found")]
    GrantNotFound { grant_id: Uuid },

    #[error("execution grant {grant_id} has been revoked")]
    GrantRevoked { grant_id: Uuid },

    #[error("execution grant {grant_id} has expired")]
    GrantExpired { grant_id: Uuid },

    #[error("execution grant {grant_id} does not cover graph '{graph_id}'")]
    GrantScopeMismatch { grant_id: Uuid, graph_id: String },

    #[error("execution grant {grant_id} carries malformed scopes")]
    CorruptGrantScopes { grant_id: Uuid },

    #[error("run {run_id} not found")]
    RunNotFound { run_id: Uuid },

    #[error("run {run_id} is already terminal ({status})")]
    RunAlreadyTerminal { run_id: Uuid, status: RunStatus },

    #[error("run {run_id} cannot transition from {from} to {to}")]
    InvalidRunTransition {
        run_id: Uuid,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("schedule {schedule_id} was modified concurrently")]
    UpdateConflict { schedule_id: Uuid },

    #[error("job queue unavailable: {detail}")]
    QueueUnavailable { detail: String },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl SchedulerError {
    /// Stable machine-readable code for the boundary (SCREAMING_SNAKE_CASE).
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::InvalidCronExpression { .. } => "INVALID_CRON_EXPRESSION",
            SchedulerError::InvalidTimezone { .. } => "INVALID_TIMEZONE",
            SchedulerError::ScheduleNotFound { .. } => "SCHEDULE_NOT_FOUND",
            SchedulerError::ScheduleAccessDenied { .. } => "SCHEDULE_ACCESS_DENIED",
            SchedulerError::GrantNotFound { .. } => "GRANT_NOT_FOUND",
            SchedulerError::GrantRevoked { .. } => "GRANT_REVOKED",
            SchedulerError::GrantExpired { .. } => "GRANT_EXPIRED",
            SchedulerError::GrantScopeMismatch { .. } => "GRANT_SCOPE_MISMATCH",
            SchedulerError::CorruptGrantScopes { .. } => "INTERNAL_SERVER_ERROR",
            SchedulerError::RunNotFound { .. } => "RUN_NOT_FOUND",
            SchedulerError::RunAlreadyTerminal { .. } => "RUN_ALREADY_TERMINAL",
            SchedulerError::InvalidRunTransition { .. } => "INVALID_RUN_TRANSITION",
            SchedulerError::UpdateConflict { .. } => "CONFLICT",
            SchedulerError::QueueUnavailable { .. } => "SERVICE_UNAVAILABLE",
            SchedulerError::Database(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// HTTP status the boundary maps this variant to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            SchedulerError::InvalidCronExpression { .. }
            | SchedulerError::InvalidTimezone { .. } => StatusCode::BAD_REQUEST,
            SchedulerError::ScheduleNotFound { .. }
            | SchedulerError::GrantNotFound { .. }
            | SchedulerError::RunNotFound { .. } => StatusCode::NOT_FOUND,
            SchedulerError::ScheduleAccessDenied { .. }
            | SchedulerError::GrantRevoked { .. }
            | SchedulerError::GrantExpired { .. }
            | SchedulerError::GrantScopeMismatch { .. } => StatusCode::FORBIDDEN,
            SchedulerError::RunAlreadyTerminal { .. }
            | SchedulerError::InvalidRunTransition { .. }
            | SchedulerError::UpdateConflict { .. } => StatusCode::CONFLICT,
            SchedulerError::QueueUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SchedulerError::CorruptGrantScopes { .. } | SchedulerError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::UpdateConflict { .. } | SchedulerError::QueueUnavailable { .. }
        )
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract current trace ID from the active tracing span (falls back to generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                // Fallback: generate a correlation ID for basic client-server log correlation
                Some(format!("corr-{}", &Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Detect unique-constraint violations across the supported backends.
pub fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    if let Some(code) = db_error.code() {
        let code_str = code.as_ref();
        if code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str) {
            return true;
        }
    }

    false
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        // Add Retry-After header if present
        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<SchedulerError> for ApiError {
    fn from(error: SchedulerError) -> Self {
        let status = error.status_code();
        let code = error.code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Internals are logged, not leaked to the caller.
            tracing::error!(error = ?error, "Internal scheduler error");
            return Self::new(status, code, "An internal error occurred");
        }

        let message = error.to_string();
        let api_error = Self::new(status, code, message.as_str());
        if error.is_retryable() {
            api_error.with_retry_after(1)
        } else {
            api_error
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create an unauthorized error (401) with explicit trace_id
pub fn unauthorized_with_trace_id(message: Option<&str>, trace_id: String) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    let mut error = ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg);
    error.trace_id = Some(trace_id.into_boxed_str());
    error
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}
