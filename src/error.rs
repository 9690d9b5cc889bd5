//! HTTP error boundary.
//!
//! DESIGN
//! ======
//! Services return their own `thiserror` enums. Handlers convert them into
//! [`ApiError`] with `?`, and `ApiError` renders every failure as JSON with a
//! stable `E_…` code. Internal details (SQL errors, IO errors) are logged and
//! replaced with a generic message before leaving the process.

use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::llm::types::LlmError;
use crate::rate_limit::Decision;
use crate::services::admin::AdminError;
use crate::services::auth::AuthError;
use crate::services::conversation::ConversationError;
use crate::services::secure_folder::SecureFolderError;

/// Stable machine-readable error code plus retry hint.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// API ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Anonymous quota used up for this window.
    #[error("{}", .0.message)]
    QuotaExceeded(Decision),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Request body over the upload ceiling.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// The LLM provider failed after retries.
    #[error("Error communicating with the language model: {0}")]
    Upstream(#[from] LlmError),

    #[error("AI features are not configured on this server")]
    LlmUnavailable,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl ErrorCode for ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::QuotaExceeded(_) => "E_QUOTA_EXCEEDED",
            Self::Validation(_) => "E_VALIDATION",
            Self::Unauthorized(_) => "E_UNAUTHORIZED",
            Self::Forbidden(_) => "E_FORBIDDEN",
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::PayloadTooLarge(_) => "E_PAYLOAD_TOO_LARGE",
            Self::Upstream(e) => e.error_code(),
            Self::LlmUnavailable => "E_LLM_UNAVAILABLE",
            Self::Database(_) => "E_DATABASE",
            Self::Internal(_) => "E_INTERNAL",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::QuotaExceeded(_) | Self::LlmUnavailable => true,
            Self::Upstream(e) => e.retryable(),
            _ => false,
        }
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::LlmUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::QuotaExceeded(d) => d.kind.rejection_type(),
            Self::Validation(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Upstream(_) => "upstream_error",
            Self::LlmUnavailable => "service_unavailable",
            Self::Database(_) | Self::Internal(_) => "internal_error",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::QuotaExceeded(d) => d.kind.rejection_title(),
            Self::Validation(_) => "Bad request",
            Self::Unauthorized(_) => "Not authenticated",
            Self::Forbidden(_) => "Forbidden",
            Self::NotFound(_) => "Not found",
            Self::PayloadTooLarge(_) => "Payload too large",
            Self::Upstream(_) => "Upstream error",
            Self::LlmUnavailable => "Service unavailable",
            Self::Database(_) | Self::Internal(_) => "Internal server error",
        }
    }

    /// Message safe to show to the caller.
    fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Database(e) => tracing::error!(error = %e, "request failed: database"),
            Self::Internal(msg) => tracing::error!(error = %msg, "request failed: internal"),
            Self::Upstream(e) => tracing::warn!(error = %e, code = e.error_code(), "request failed: llm"),
            _ => {}
        }

        let mut body = json!({
            "error": self.title(),
            "message": self.public_message(),
            "type": self.kind(),
            "code": self.error_code(),
        });
        if matches!(self, Self::QuotaExceeded(_)) {
            body["requires_login"] = json!(true);
        }

        (status, Json(body)).into_response()
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

impl ApiError {
    /// Body-level failure reported by an extractor. Oversized bodies keep
    /// their 413; everything else is the caller's malformed request.
    #[must_use]
    pub fn from_rejection(status: StatusCode, detail: &str) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(format!("Upload too large: {detail}"))
        } else {
            Self::Validation(format!("Invalid request: {detail}"))
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::from_rejection(rejection.status(), &rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        Self::from_rejection(rejection.status(), &rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::from_rejection(rejection.status(), &rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(rejection: MultipartError) -> Self {
        Self::from_rejection(rejection.status(), &rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::from_rejection(rejection.status(), &rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::from_rejection(rejection.status(), &rejection.body_text())
    }
}

impl From<Decision> for ApiError {
    fn from(decision: Decision) -> Self {
        Self::QuotaExceeded(decision)
    }
}

impl From<ConversationError> for ApiError {
    fn from(err: ConversationError) -> Self {
        match err {
            ConversationError::Llm(e) => Self::Upstream(e),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::Inactive => Self::Unauthorized(err.to_string()),
            AuthError::EmailTaken | AuthError::WeakPassword | AuthError::InvalidEmail => {
                Self::Validation(err.to_string())
            }
            AuthError::Hash(msg) => Self::Internal(msg),
            AuthError::Database(e) => Self::Database(e),
        }
    }
}

impl From<SecureFolderError> for ApiError {
    fn from(err: SecureFolderError) -> Self {
        match err {
            SecureFolderError::FolderMissing | SecureFolderError::Empty | SecureFolderError::FileMissing(_) => {
                Self::NotFound(err.to_string())
            }
            SecureFolderError::Unreadable => Self::Internal(err.to_string()),
            SecureFolderError::InvalidFilename(_)
            | SecureFolderError::NotPdf(_)
            | SecureFolderError::AlreadyExists(_)
            | SecureFolderError::NoFiles => Self::Validation(err.to_string()),
            SecureFolderError::Io(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<AdminError> for ApiError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::SelfDemotion | AdminError::SelfSuspension | AdminError::InvalidRole => {
                Self::Validation(err.to_string())
            }
            AdminError::UserNotFound => Self::NotFound(err.to_string()),
            AdminError::Auth(e) => e.into(),
            AdminError::Database(e) => Self::Database(e),
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
