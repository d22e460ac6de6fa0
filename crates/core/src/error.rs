//! Domain-level error type shared across workspace crates.

use crate::types::DbId;

/// Errors raised by domain logic, independent of any transport.
///
/// The API layer maps each variant onto an HTTP status and stable error
/// code; see `darkroom-api`'s `error` module.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An entity lookup by id came back empty.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: String, id: DbId },

    /// Input failed a domain validation rule.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The request conflicts with existing state (e.g. duplicate username).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or invalid credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed to touch this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unexpected internal failure; details are logged, not surfaced.
    #[error("Internal error: {0}")]
    Internal(String),
}
