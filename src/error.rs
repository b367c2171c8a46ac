//! # Error Handling
//!
//! A single error enum covers every failure mode in the engine. Variants map
//! one-to-one onto the HTTP statuses the API surfaces, which keeps handler
//! signatures uniform: everything returns [`Result<T>`] and the router turns
//! the error into a response.
//!
//! Request cancellation has no variant on purpose. When a client disconnects,
//! axum drops the handler future; an in-flight [`crate::write::WriteTx`]
//! rolls back in its `Drop` impl and no response is ever written.
//!
//! | Category | Variants | Status |
//! |----------|----------|--------|
//! | Caller | `Unauthenticated`, `Forbidden`, `BadRequest`, `NotFound`, `Conflict` | 4xx |
//! | Engine | `Store`, `Migration`, `Oracle`, `Json`, `Io`, `Internal` | 500 |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur while serving a request or running the engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid credential on a protected endpoint.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Credential is valid but policy denies the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Request body cannot be parsed or violates a field constraint.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A referenced entity does not exist in the caller's tenant.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Uniqueness or precondition violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The tenant store could not be opened, read, or written.
    ///
    /// Never retried by the engine; the in-flight transaction (if any) is
    /// rolled back.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// A schema migration failed while opening a tenant store.
    ///
    /// Fatal to that tenant's first-access request only; the process keeps
    /// serving other tenants.
    #[error("migration {version} ({name}) failed: {source}")]
    Migration {
        version: i32,
        name: &'static str,
        source: rusqlite::Error,
    },

    /// The coordination service refused or timed out an operation.
    ///
    /// When this happens mid-write the transaction rolls back: no journal
    /// row, no notification.
    #[error("coordination service error: {0}")]
    Oracle(#[from] redis::RedisError),

    /// Payload serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem or network I/O failed outside SQLite.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An engine invariant was violated. Indicates a bug, not caller error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The HTTP status this error surfaces as.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Store(_)
            | Error::Migration { .. }
            | Error::Oracle(_)
            | Error::Json(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message exposed to clients.
    ///
    /// Engine-side failures are collapsed to a generic message; details stay
    /// in the server log.
    fn public_message(&self) -> String {
        match self {
            Error::Unauthenticated(m) => m.clone(),
            Error::Forbidden(m) => m.clone(),
            Error::BadRequest(m) => m.clone(),
            Error::NotFound(what) => format!("{what} not found"),
            Error::Conflict(m) => m.clone(),
            Error::Store(_) | Error::Migration { .. } => "store unavailable".to_string(),
            Error::Oracle(_) => "coordination service unavailable".to_string(),
            Error::Json(_) | Error::Io(_) | Error::Internal(_) => {
                "internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.public_message() }));
        (status, body).into_response()
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_contract() {
        assert_eq!(
            Error::Unauthenticated("no token".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::Forbidden("locked".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::BadRequest("name required".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::NotFound("project").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::Conflict("email already registered".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Internal("bug".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_errors_hide_details_from_clients() {
        let err = Error::Store(rusqlite::Error::InvalidParameterName("secret".into()));
        assert_eq!(err.public_message(), "store unavailable");
    }

    #[test]
    fn sqlite_error_converts_via_from() {
        let sqlite_err = rusqlite::Error::InvalidParameterName("x".into());
        let err: Error = sqlite_err.into();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn not_found_display() {
        assert_eq!(Error::NotFound("card").to_string(), "card not found");
    }
}
