//! Data models for the stashq task queue.
//!
//! - `TaskRecord` - A task as stored in the bucket
//! - `TaskStatus` - The namespace a task currently lives in
//! - `NewTask` / `Outcome` - Inputs to `create` and `complete`
//! - `Namespaces` - The status <-> object key mapping

/// Status namespace to key mapping.
pub mod namespace;
/// Task record model and related types.
pub mod task;

pub use namespace::{key_for, namespaces, Namespaces, KEY_SUFFIX};
pub use task::{NewTask, Outcome, TaskRecord, TaskStatus, DEFAULT_PRIORITY};
