//! Typed error hierarchy for the board service.
//!
//! Two top-level enums cover the two subsystems:
//! - `StoreError`: persistence and authorization failures
//! - `DragError`: client-side drag orchestration failures

use thiserror::Error;

/// Errors from the persistent store, including the authorization checks that
/// gate access to it. `Unauthorized` and `NotFound` are deliberately distinct
/// conditions: a board the caller may not see is never reported as missing.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("user {user_id} is not a member of board {board_id}")]
    Unauthorized { user_id: i64, board_id: i64 },

    #[error("role '{role}' may not perform this operation")]
    Forbidden { role: &'static str },

    #[error("{0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Internal(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }
}

/// Errors from a single drag-end handled by the optimistic controller.
#[derive(Debug, Error)]
pub enum DragError {
    #[error("board is read-only for this user")]
    ReadOnly,

    /// The persistence batch failed. The controller has already restored the
    /// pre-drag snapshot by the time this is returned.
    #[error("failed to persist new order: {0}")]
    PersistFailed(#[source] StoreError),
}
