//! Error handling module for the POI annotator.
//!
//! Provides centralized error types with mapping to HTTP status codes and response envelopes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::geometry::GeometryError;

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const STORE_UNAVAILABLE: &str = "STORE_UNAVAILABLE";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// The ownership or elevation rule a rejected mutation violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DenyReason {
    /// The draft belongs to another session (or to no session at all).
    NotOwner,
    /// The action requires elevated permission.
    NotElevated,
    /// Only elevated actors may edit an approved POI.
    AlreadyApproved,
    /// Approved POIs cannot be deleted by anyone.
    ApprovedImmutable,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NotOwner => "notOwner",
            DenyReason::NotElevated => "notElevated",
            DenyReason::AlreadyApproved => "alreadyApproved",
            DenyReason::ApprovedImmutable => "approvedImmutable",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "notOwner" => Some(DenyReason::NotOwner),
            "notElevated" => Some(DenyReason::NotElevated),
            "alreadyApproved" => Some(DenyReason::AlreadyApproved),
            "approvedImmutable" => Some(DenyReason::ApprovedImmutable),
            _ => None,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            DenyReason::NotOwner => "POI belongs to another session",
            DenyReason::NotElevated => "Elevated permission required",
            DenyReason::AlreadyApproved => "POI is already approved",
            DenyReason::ApprovedImmutable => "Approved POIs cannot be deleted",
        }
    }
}

/// Application error type.
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// A wrong capability token was presented
    Unauthorized(String),
    /// Ownership or elevation rule violated
    PermissionDenied(DenyReason),
    /// Resource not found
    NotFound(String),
    /// Validation error
    Validation(String),
    /// The authoritative store could not be reached or written
    StoreUnavailable(String),
    /// Database error
    Database(String),
    /// Internal server error
    Internal(String),
    /// Bad request
    BadRequest(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::PermissionDenied(_) => codes::PERMISSION_DENIED,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::StoreUnavailable(_) => codes::STORE_UNAVAILABLE,
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::PermissionDenied(reason) => reason.describe().to_string(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::StoreUnavailable(msg) => msg.clone(),
            AppError::Database(msg) => msg.clone(),
            AppError::Internal(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
        }
    }

    /// Rebuild an error from a response envelope produced by [`ErrorResponse`].
    pub fn from_details(details: &ErrorDetails) -> Self {
        let message = details.message.clone();
        match details.code.as_str() {
            codes::UNAUTHORIZED => AppError::Unauthorized(message),
            codes::PERMISSION_DENIED => details
                .details
                .as_ref()
                .and_then(|d| d.get("rule"))
                .and_then(|r| r.as_str())
                .and_then(DenyReason::from_str)
                .map(AppError::PermissionDenied)
                .unwrap_or(AppError::Internal(message)),
            codes::NOT_FOUND => AppError::NotFound(message),
            codes::VALIDATION_ERROR => AppError::Validation(message),
            codes::STORE_UNAVAILABLE => AppError::StoreUnavailable(message),
            codes::DATABASE_ERROR => AppError::Database(message),
            codes::BAD_REQUEST => AppError::BadRequest(message),
            _ => AppError::Internal(message),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        tracing::error!("Store I/O error: {:?}", err);
        AppError::StoreUnavailable(format!("Store I/O error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        tracing::warn!("Remote store error: {}", err);
        AppError::StoreUnavailable(format!("Remote store error: {}", err))
    }
}

impl From<GeometryError> for AppError {
    fn from(err: GeometryError) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
}

impl ErrorResponse {
    pub fn new(error: &AppError) -> Self {
        let details = match error {
            AppError::PermissionDenied(reason) => {
                Some(serde_json::json!({ "rule": reason.as_str() }))
            }
            _ => None,
        };

        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
                details,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::new(&self);
        (status, Json(body)).into_response()
    }
}
