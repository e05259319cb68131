//! Domain error types for the quotes board
//!
//! Errors are structured internally for logging/debugging but provide
//! generic responses to clients to avoid leaking sensitive information.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::document::DocumentError;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("Not found: {0}")]
    NotFound(&'static str),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StorageError::Duplicate(db.message().to_string());
            }
        }
        StorageError::Database(Box::new(err))
    }
}

impl From<DocumentError> for StorageError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Duplicate(what) => StorageError::Duplicate(what),
            DocumentError::Conflict { attempts } => {
                StorageError::Conflict(format!("gave up after {attempts} attempts"))
            }
            DocumentError::Encode(e) => StorageError::Serialization(e),
            other => StorageError::Remote(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication required")]
    Required,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid credentials for login: {0}")]
    InvalidCredentials(String),

    #[error("Account disabled: {0}")]
    AccountDisabled(String),

    #[error("Telegram verification failed: {0}")]
    Telegram(&'static str),

    #[error("Not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Storage(StorageError::Duplicate(_)) => StatusCode::BAD_REQUEST,
            AppError::Storage(StorageError::Conflict(_)) => StatusCode::CONFLICT,
            AppError::Storage(StorageError::Unsupported(_)) => StatusCode::NOT_FOUND,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,

            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,

            AppError::Auth(AuthError::NotConfigured(_) | AuthError::Hashing(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,

            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,

            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a client-safe response message (generic, no internal details)
    pub fn client_message(&self) -> String {
        match self {
            AppError::Storage(StorageError::Duplicate(_)) => "Duplicate entry".into(),
            AppError::Storage(StorageError::Conflict(_)) => {
                "The data was changed concurrently, please retry".into()
            }
            AppError::Storage(StorageError::Unsupported(what)) => {
                format!("{what} is not available with the active storage backend")
            }
            AppError::Storage(_) => "Service temporarily unavailable".into(),

            AppError::Validation(_) => "Validation failed".into(),
            AppError::BadRequest(msg) => msg.clone(),

            AppError::Auth(AuthError::Required) => "Authentication required".into(),
            AppError::Auth(AuthError::InvalidToken) => "Invalid or expired token".into(),
            AppError::Auth(AuthError::InvalidCredentials(_)) => {
                "Invalid username or password".into()
            }
            AppError::Auth(AuthError::AccountDisabled(_)) => "Account is disabled".into(),
            AppError::Auth(AuthError::Telegram(_)) => "Verification failed".into(),
            AppError::Auth(_) => "Service temporarily unavailable".into(),

            AppError::Forbidden(msg) | AppError::NotFound(msg) => (*msg).into(),

            AppError::Config(_) | AppError::Internal(_) => "Server error".into(),
        }
    }

    fn field_errors(&self) -> Option<Vec<FieldError>> {
        match self {
            AppError::Validation(errors) => Some(errors.clone()),
            _ => None,
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Internal error text attached to 5xx responses as an extension.
///
/// `handlers::expose_error_detail` copies it into the body outside production.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub body: ErrorBody,
    pub detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = ErrorBody {
            status: if status.is_client_error() { "fail" } else { "error" },
            message: self.client_message(),
            errors: self.field_errors(),
            detail: None,
        };
        let mut response = (status, Json(body.clone())).into_response();
        if status.is_server_error() {
            response.extensions_mut().insert(ErrorReport {
                body,
                detail: self.to_string(),
            });
        }
        response
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;
