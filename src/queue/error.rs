//! Error types for queue operations.

use thiserror::Error;
use uuid::Uuid;

use super::codec::DecodeError;
use crate::models::TaskStatus;
use crate::storage::StorageError;

/// Errors returned by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The task is not in the one namespace the operation requires.
    ///
    /// Returned by `claim` (expects `Pending`), `complete` (expects `Active`)
    /// and `retry` (expects `Failed`). Either the caller assumed the wrong
    /// state or another caller transitioned the task first.
    #[error("Task {task_id} is not {expected}")]
    NotFoundInStatus {
        /// The task that was looked up.
        task_id: Uuid,
        /// The status the operation required.
        expected: TaskStatus,
    },

    /// The task is in none of the namespaces the operation accepts.
    #[error("Task not found: {task_id}")]
    NotFound {
        /// The task that was looked up.
        task_id: Uuid,
    },

    /// A conditional transition lost a race. Either the destination object
    /// already existed, or the source was moved or rewritten after it was read
    /// (the stale destination copy has been removed again).
    ///
    /// Only returned when conditional writes are in force.
    #[error("Task {task_id} was changed concurrently at {status}")]
    Conflict {
        /// The task that was being transitioned.
        task_id: Uuid,
        /// The occupied destination, or the source that changed underneath.
        status: TaskStatus,
    },

    /// A single stored record could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// An object store error, passed through untouched.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The operation was cancelled through its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// The operation ran past its deadline.
    #[error("Operation timed out")]
    TimedOut,
}

impl QueueError {
    /// Creates a `NotFoundInStatus` error.
    #[must_use]
    pub const fn not_in_status(task_id: Uuid, expected: TaskStatus) -> Self {
        Self::NotFoundInStatus { task_id, expected }
    }

    /// Creates a `NotFound` error.
    #[must_use]
    pub const fn not_found(task_id: Uuid) -> Self {
        Self::NotFound { task_id }
    }

    /// Returns true if the operation may have stopped between the write and
    /// delete halves of a transition, leaving the task in two namespaces.
    #[must_use]
    pub const fn may_have_partially_applied(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Cancelled | Self::TimedOut)
    }

    /// Returns a helpful suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NotFoundInStatus { .. } => {
                "The task is not where this operation expects it. Another worker may \
                 have transitioned it first. Run `stashq trace <id>` to see its \
                 current status."
            }
            Self::NotFound { .. } => {
                "Only pending or active tasks can be cancelled. The task may already \
                 be finished or deleted, or the ID may be incorrect."
            }
            Self::Conflict { .. } => {
                "Another caller completed the same transition first. This is normal \
                 when several workers race for one task; move on to another task."
            }
            Self::Decode(_) => {
                "The stored object is not a valid task record. It may have been \
                 written by an incompatible version or edited by hand. Inspect it \
                 directly in the bucket."
            }
            Self::Storage(storage_err) => storage_err.suggestion(),
            Self::Cancelled | Self::TimedOut => {
                "The operation was interrupted and may have been applied partially. \
                 Run `stashq trace <id>` or `stashq duplicates` to check where the \
                 task ended up before retrying."
            }
        }
    }

    /// Returns a richly formatted error message with context and suggestions.
    ///
    /// This format is designed for CLI output.
    #[must_use]
    pub fn display_rich(&self) -> String {
        format!("Error: {self}\n\nSuggestion:\n  {}", self.suggestion())
    }
}
