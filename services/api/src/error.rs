//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service, plus the
//! mapping from the core error taxonomy to HTTP status codes.

use axum::http::StatusCode;

use crate::config::ConfigError;
use tutorbook_core::ports::CoreError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from the booking core.
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error while applying embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Maps a core error to its HTTP response: caller-fault validation 400,
/// missing auth 401, ownership 403, missing rows 404, conflicts 409,
/// transient store failures 500.
pub fn core_error_response(e: CoreError) -> (StatusCode, String) {
    let status = match &e {
        CoreError::InvalidRange
        | CoreError::PastSlot
        | CoreError::SlotLocked
        | CoreError::AlreadyCancelled
        | CoreError::AlreadyCompleted
        | CoreError::NotConfirmed
        | CoreError::AlreadyRated
        | CoreError::NotCompleted
        | CoreError::InvalidRating => StatusCode::BAD_REQUEST,
        CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
        CoreError::Forbidden => StatusCode::FORBIDDEN,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::OverlapConflict
        | CoreError::SlotAlreadyBooked
        | CoreError::EmailTaken
        | CoreError::ProfileExists => StatusCode::CONFLICT,
        CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}
