//! Common test utilities.
//!
//! S3 configuration is read from environment variables:
//!
//! ```bash
//! export S3_ENDPOINT=http://localhost:9000 S3_BUCKET=stashq-dev S3_REGION=us-east-1
//! cargo test --test integration --features integration
//! ```

use std::sync::Arc;

use stashq::models::NewTask;
use stashq::queue::{Queue, QueueConfig};
use stashq::storage::{MemoryStore, S3Client, S3Config};
use uuid::Uuid;

/// A queue over a fresh in-memory store without conditional writes.
pub fn memory_queue() -> (Arc<MemoryStore>, Queue) {
    let store = Arc::new(MemoryStore::new());
    (store.clone(), Queue::new(store))
}

/// A queue over a fresh in-memory store that honors `put_if_absent`.
pub fn conditional_memory_queue() -> (Arc<MemoryStore>, Queue) {
    let store = Arc::new(MemoryStore::with_conditional_writes());
    (store.clone(), Queue::new(store))
}

/// Creates a queue on S3 under a prefix unique to the calling test.
///
/// Environment variables (with defaults):
/// - `S3_ENDPOINT`: S3 endpoint URL (default: `http://localhost:9000`)
/// - `S3_BUCKET`: Bucket name (default: `stashq-dev`)
/// - `S3_REGION`: AWS region (default: `us-east-1`)
/// - `STASHQ_CONDITIONAL_WRITES`: `1` if the service honors `If-None-Match`
///
/// # Panics
///
/// Panics if the S3 client cannot be created.
pub async fn s3_queue() -> Queue {
    let endpoint =
        std::env::var("S3_ENDPOINT").unwrap_or_else(|_| "http://localhost:9000".to_string());
    let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "stashq-dev".to_string());
    let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let conditional = std::env::var("STASHQ_CONDITIONAL_WRITES")
        .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

    let config =
        S3Config::new(Some(endpoint), bucket, region).with_conditional_writes(conditional);
    let client = S3Client::new(config)
        .await
        .expect("Failed to create S3 client - is the S3 service running?");

    let queue_config = QueueConfig {
        prefix: format!("test-{}/", Uuid::new_v4()),
        ..Default::default()
    };
    Queue::with_config(Arc::new(client), queue_config)
}

/// A task input with recognizable fields.
#[must_use]
pub fn sample_task(function: &str) -> NewTask {
    NewTask::new(function, "Private Team", "{\"credentials\":\"opaque\"}")
}
