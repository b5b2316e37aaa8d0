use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

/// A single rejected field in a quiz submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Every violation found while validating a submission
#[derive(Debug, Clone, PartialEq, Eq, Default, thiserror::Error)]
#[error("{} field(s) failed validation", violations.len())]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Session storage error: {0}")]
    SessionStorage(String),

    #[error("Provider degraded: {0}")]
    ProviderDegraded(String),

    #[error("Recommendation generation failed: {0}")]
    Generation(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable, caller-facing error code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::SessionStorage(_) => "SESSION_STORAGE_ERROR",
            AppError::ProviderDegraded(_) => "PROVIDER_DEGRADED",
            AppError::Generation(_) => "GENERATION_ERROR",
            AppError::CacheUnavailable(_) => "CACHE_UNAVAILABLE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Database(_)
            | AppError::Cache(_)
            | AppError::HttpClient(_)
            | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to the caller; raw transport errors stay in the logs
    fn public_message(&self) -> String {
        match self {
            AppError::Validation(e) => e.to_string(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Generation(_) => {
                "Recommendations are temporarily unavailable, please try again".to_string()
            }
            AppError::SessionStorage(_) | AppError::CacheUnavailable(_) => {
                "A storage dependency is temporarily unavailable".to_string()
            }
            AppError::ProviderDegraded(_)
            | AppError::Database(_)
            | AppError::Cache(_)
            | AppError::HttpClient(_)
            | AppError::Internal(_) => "An unexpected error occurred".to_string(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Generation(_) | AppError::CacheUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::ProviderDegraded(_) | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::SessionStorage(_)
            | AppError::Database(_)
            | AppError::Cache(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        let mut error = json!({
            "code": self.code(),
            "message": self.public_message(),
        });
        if let AppError::Validation(validation) = &self {
            error["details"] = json!(validation.violations);
        }

        let body = Json(json!({
            "success": false,
            "error": error
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
