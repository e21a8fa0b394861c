//! Object storage for the stashq task queue.
//!
//! The queue talks to storage only through the [`ObjectStore`] trait:
//! PUT, GET, DELETE and LIST over a single bucket, plus optional
//! create-only PUTs and `If-Match` DELETEs advertised through
//! [`StoreCapabilities`]. Two
//! implementations ship with the crate: [`S3Client`] for S3-compatible
//! services and [`MemoryStore`] for tests and local experiments.

mod client;
mod error;
mod memory;
mod store;

pub use client::{PutCondition, S3Client, S3Config};
pub use error::StorageError;
pub use memory::MemoryStore;
pub use store::{ObjectStore, StoreCapabilities, VersionedObject};
