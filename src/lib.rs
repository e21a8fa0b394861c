//! stashq - S3-Only Task Queue State Machine
//!
//! A task queue whose only durable store is an S3-compatible bucket. A task's
//! status is encoded by where its JSON record lives (`pending/`, `active/`,
//! `completed/`, `failed/`, `cancelled/`), and every transition moves the
//! record by writing the new object before deleting the old one.

pub mod cli;
pub mod config;
pub mod models;
pub mod queue;
pub mod storage;

pub use models::{NewTask, Outcome, TaskRecord, TaskStatus};
pub use queue::{
    connect, ClaimGuarantee, ClaimStrategy, ConnectError, ConnectOptions, ListOptions,
    ListReport, Queue, QueueConfig, QueueError, TraceSummary,
};
pub use storage::{MemoryStore, ObjectStore, S3Client, StorageError};
