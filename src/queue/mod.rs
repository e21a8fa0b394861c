//! The queue state machine and its read-only query layer.
//!
//! A task's status is its location: `{prefix}{status}/{id}.json`. Every
//! transition writes the new location before deleting the old one, so an
//! interrupted transition duplicates a task and never loses it.

/// Task record encoding and decoding.
pub mod codec;
mod config;
mod connect;
mod error;
mod ops;
mod query;

pub use codec::DecodeError;
pub use config::{ClaimGuarantee, ClaimStrategy, QueueConfig};
pub use connect::{connect, open, ConnectError, ConnectOptions};
pub use error::QueueError;
pub use ops::{Clock, Queue, SystemClock};
pub use query::{ListOptions, ListReport, SkippedKey, TraceSummary};
