use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;
use weblens_analysis::AnalysisError;
use weblens_fetch::FetchError;
use weblens_ingest::IngestError;
use weblens_insights::RegistryError;
use weblens_metrics::MetricsError;
use weblens_storage::StorageError;

/// API-surface errors. Every variant maps to one of the enumerated wire
/// codes and an HTTP status; the envelope shape is
/// `{"error": {code, message, details, timestamp}, "correlation_id"}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    InvalidRequest { message: String, details: Value },

    #[error("{message}")]
    ValidationFailed { message: String, details: Value },

    #[error("workspace not found: {id}")]
    WorkspaceNotFound { id: Uuid },

    #[error("workspace is inactive: {id}")]
    WorkspaceInactive { id: Uuid },

    #[error("insight not found: {id}")]
    InsightNotFound { id: Uuid },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("rate limit exceeded for workspace {workspace_id}")]
    RateLimited { workspace_id: Uuid },

    #[error("operation timed out")]
    RequestTimeout,

    #[error("invalid url: {url}")]
    InvalidUrl { url: String },

    #[error("connection to upstream failed")]
    ConnectionError { url: String },

    #[error("upstream returned an unusable response")]
    BadGateway { detail: String },

    #[error("batch size {size} exceeds the {max} URL limit")]
    BatchSizeExceeded { size: usize, max: usize },

    #[error("not enough data to answer the query")]
    InsufficientData,

    #[error("storage operation failed")]
    Database { message: String },

    #[error("internal server error")]
    Internal { message: String },
}

impl ApiError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn invalid_request_with(message: impl Into<String>, details: Value) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            details,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest { .. }
            | ApiError::ValidationFailed { .. }
            | ApiError::InvalidUrl { .. }
            | ApiError::BatchSizeExceeded { .. }
            | ApiError::InsufficientData => StatusCode::BAD_REQUEST,
            ApiError::WorkspaceNotFound { .. }
            | ApiError::InsightNotFound { .. }
            | ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::WorkspaceInactive { .. } => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::ConnectionError { .. } | ApiError::BadGateway { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Database { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire code from the enumerated taxonomy.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest { .. } => "INVALID_REQUEST",
            ApiError::ValidationFailed { .. } => "VALIDATION_FAILED",
            ApiError::WorkspaceNotFound { .. } => "WORKSPACE_NOT_FOUND",
            ApiError::WorkspaceInactive { .. } => "FORBIDDEN",
            ApiError::InsightNotFound { .. } => "INSIGHT_NOT_FOUND",
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::RequestTimeout => "REQUEST_TIMEOUT",
            ApiError::InvalidUrl { .. } => "INVALID_URL",
            ApiError::ConnectionError { .. } => "CONNECTION_ERROR",
            ApiError::BadGateway { .. } => "BAD_GATEWAY",
            ApiError::BatchSizeExceeded { .. } => "BATCH_SIZE_EXCEEDED",
            ApiError::InsufficientData => "INSUFFICIENT_DATA",
            ApiError::Database { .. } => "DATABASE_ERROR",
            ApiError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Value {
        match self {
            ApiError::InvalidRequest { details, .. }
            | ApiError::ValidationFailed { details, .. } => details.clone(),
            ApiError::WorkspaceNotFound { id }
            | ApiError::WorkspaceInactive { id }
            | ApiError::InsightNotFound { id } => json!({"id": id}),
            ApiError::RateLimited { workspace_id } => json!({"workspace_id": workspace_id}),
            ApiError::InvalidUrl { url } | ApiError::ConnectionError { url } => {
                json!({"url": url})
            }
            ApiError::BatchSizeExceeded { size, max } => json!({"size": size, "max": max}),
            _ => Value::Null,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let correlation_id = Uuid::new_v4();

        // Upstream and internal causes are logged, not leaked to clients.
        match &self {
            ApiError::Internal { message } | ApiError::Database { message } => {
                tracing::error!(code, %correlation_id, message, "request failed");
            }
            ApiError::BadGateway { detail } => {
                tracing::error!(code, %correlation_id, detail, "upstream failure");
            }
            other if status.is_client_error() => {
                tracing::warn!(code, %correlation_id, error = %other, "client error");
            }
            other => {
                tracing::error!(code, %correlation_id, error = %other, "request failed");
            }
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
                "details": self.details(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            },
            "correlation_id": correlation_id,
        }));
        (status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound { entity: "insight", id } => ApiError::InsightNotFound { id },
            StorageError::NotFound { entity, id } => ApiError::Database {
                message: format!("{entity} {id} missing"),
            },
            other => ApiError::Database {
                message: other.to_string(),
            },
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(error: AnalysisError) -> Self {
        match error {
            AnalysisError::InvalidUrl { url } => ApiError::InvalidUrl { url },
            AnalysisError::Fetch(fetch) => fetch.into(),
            AnalysisError::Storage(storage) => storage.into(),
            AnalysisError::Cancelled => ApiError::RequestTimeout,
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::InvalidUrl { url } => ApiError::InvalidUrl { url },
            FetchError::Timeout { .. } => ApiError::RequestTimeout,
            FetchError::Connection { url, .. } => ApiError::ConnectionError { url },
            FetchError::TooManyRedirects { url } => ApiError::BadGateway {
                detail: format!("redirect limit exceeded for {url}"),
            },
            FetchError::TooLarge { url, limit } => ApiError::BadGateway {
                detail: format!("body over {limit} bytes from {url}"),
            },
            FetchError::Client { message } => ApiError::Internal { message },
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::BatchTooLarge { size } => ApiError::invalid_request_with(
                format!("event batch of {size} exceeds the limit"),
                json!({"size": size}),
            ),
            IngestError::RateLimited { workspace_id } => ApiError::RateLimited { workspace_id },
            IngestError::NoValidEvents => ApiError::validation("no valid events to process"),
            IngestError::Storage(storage) => storage.into(),
            IngestError::Cancelled => ApiError::RequestTimeout,
        }
    }
}

impl From<MetricsError> for ApiError {
    fn from(error: MetricsError) -> Self {
        match error {
            MetricsError::InvalidRange { message } => ApiError::invalid_request(message),
            MetricsError::RangeTooLarge {
                granularity,
                max_days,
            } => ApiError::invalid_request_with(
                format!("date range exceeds {max_days} days for {granularity:?} granularity"),
                json!({"max_days": max_days}),
            ),
            MetricsError::Storage(storage) => storage.into(),
            MetricsError::Cancelled => ApiError::RequestTimeout,
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::Storage(storage) => storage.into(),
            RegistryError::Cancelled => ApiError::RequestTimeout,
            other => ApiError::internal(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses_line_up() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (
                ApiError::invalid_request("x"),
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
            ),
            (
                ApiError::WorkspaceNotFound { id: Uuid::new_v4() },
                StatusCode::NOT_FOUND,
                "WORKSPACE_NOT_FOUND",
            ),
            (
                ApiError::RateLimited {
                    workspace_id: Uuid::new_v4(),
                },
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
            ),
            (ApiError::RequestTimeout, StatusCode::REQUEST_TIMEOUT, "REQUEST_TIMEOUT"),
            (
                ApiError::ConnectionError { url: "u".into() },
                StatusCode::BAD_GATEWAY,
                "CONNECTION_ERROR",
            ),
            (
                ApiError::Database { message: "m".into() },
                StatusCode::SERVICE_UNAVAILABLE,
                "DATABASE_ERROR",
            ),
        ];
        for (error, status, code) in cases {
            assert_eq!(error.status_code(), status);
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn fetch_timeout_becomes_request_timeout() {
        let api: ApiError = FetchError::Timeout { url: "u".into() }.into();
        assert_eq!(api.code(), "REQUEST_TIMEOUT");
    }

    #[test]
    fn ingest_batch_too_large_is_invalid_request() {
        let api: ApiError = IngestError::BatchTooLarge { size: 101 }.into();
        assert_eq!(api.code(), "INVALID_REQUEST");
        assert_eq!(api.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn no_valid_events_is_a_validation_failure() {
        let api: ApiError = IngestError::NoValidEvents.into();
        assert_eq!(api.code(), "VALIDATION_FAILED");
    }
}
