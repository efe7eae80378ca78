//! Error taxonomy shared by every handler.
//!
//! Each variant maps to one HTTP status and is rendered as `{"error": "..."}`.
//! Server-side failures keep their cause in the logs and answer with a generic message.

use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Message sent to clients for every 500-class failure.
pub const INTERNAL_MESSAGE: &str = "Error interno del servidor";

/// SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        // A concurrent writer won the race past our own uniqueness check.
        let is_unique_violation = e
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code == UNIQUE_VIOLATION);

        if is_unique_violation {
            AppError::Conflict("El registro ya existe".to_string())
        } else {
            AppError::Database(e)
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(format!("Cuerpo de solicitud inválido: {}", rejection.body_text()))
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The text placed in the response body.
    pub fn client_message(&self) -> String {
        match self {
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::Validation(errors) => first_validation_message(errors),
            AppError::Database(_) | AppError::Internal(_) => INTERNAL_MESSAGE.to_string(),
        }
    }
}

/// Picks a deterministic message out of the validator output (sorted by field name).
fn first_validation_message(errors: &validator::ValidationErrors) -> String {
    let field_errors = errors.field_errors();
    let mut fields: Vec<_> = field_errors.keys().copied().collect();
    fields.sort_unstable();

    fields
        .into_iter()
        .filter_map(|field| field_errors.get(field))
        .flat_map(|list| list.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Datos inválidos".to_string())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            AppError::Database(e) => tracing::error!("database failure: {:?}", e),
            AppError::Internal(msg) => tracing::error!("internal failure: {}", msg),
            AppError::Unauthorized(_) | AppError::Forbidden(_) => {
                tracing::warn!(status = status.as_u16(), "access denied: {}", self)
            }
            _ => tracing::debug!(status = status.as_u16(), "request rejected: {}", self),
        }

        let body = ErrorBody {
            error: self.client_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result alias used across handlers and the repository.
pub type AppResult<T> = Result<T, AppError>;

/// JsonBody
///
/// Drop-in replacement for `axum::Json` on request bodies whose rejection is an `AppError`,
/// so malformed payloads get the same `{error}` shape as every other failure.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);
