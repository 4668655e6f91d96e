// Errors shared by every core moderation component.
//
// The stores map their backend failures into `StorageError` so services can
// propagate with `?` without knowing which backend they run on.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModerationError {
    /// Unknown queue item, user or content unit.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transition not allowed from the item's current state, or an unknown action.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Request is missing data the engine needs (e.g. a subject reference).
    #[error("Validation failed: {0}")]
    ValidationFailure(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl ModerationError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        ModerationError::StorageError(err.to_string())
    }
}
