//! Test: cancellation tokens and deadlines abort in-flight store calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stashq::models::TaskStatus;
use stashq::queue::{Queue, QueueConfig, QueueError};
use stashq::storage::{MemoryStore, ObjectStore, StorageError, StoreCapabilities};
use tokio_util::sync::CancellationToken;

use crate::common::{memory_queue, sample_task};

/// Delegates to a `MemoryStore` but never finishes a delete.
#[derive(Debug, Default)]
struct HangingDeletes {
    inner: MemoryStore,
}

#[async_trait]
impl ObjectStore for HangingDeletes {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        self.inner.put(key, body).await
    }

    async fn put_if_absent(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        self.inner.put_if_absent(key, body).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.get(key).await
    }

    async fn delete(&self, _key: &str) -> Result<(), StorageError> {
        std::future::pending().await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list(prefix).await
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.inner.capabilities()
    }
}

fn hanging_queue() -> (Arc<HangingDeletes>, Queue) {
    let store = Arc::new(HangingDeletes::default());
    (store.clone(), Queue::new(store))
}

#[tokio::test]
async fn test_cancelled_token_aborts_before_any_write() {
    let (store, queue) = memory_queue();
    let token = CancellationToken::new();
    token.cancel();

    let err = queue
        .with_cancellation(token)
        .create(sample_task("never"))
        .await
        .unwrap_err();

    assert!(matches!(err, QueueError::Cancelled));
    assert!(err.may_have_partially_applied());
    assert!(store.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_between_write_and_delete_leaves_duplicate() {
    let (store, queue) = hanging_queue();
    let task_id = queue.create(sample_task("stuck")).await.unwrap();

    let err = queue
        .with_timeout(Duration::from_millis(200))
        .claim(task_id)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::TimedOut));

    let mut keys = store.inner.keys().await;
    keys.sort();
    assert_eq!(
        keys,
        vec![format!("active/{task_id}.json"), format!("pending/{task_id}.json")]
    );
    assert_eq!(
        queue.find_duplicates().await.unwrap(),
        vec![(task_id, vec![TaskStatus::Pending, TaskStatus::Active])]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_transition() {
    let (store, queue) = hanging_queue();
    let task_id = queue.create(sample_task("stuck")).await.unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = queue
        .with_cancellation(token)
        .claim(task_id)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Cancelled));
    assert_eq!(store.inner.len().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_configured_operation_timeout() {
    let store = Arc::new(HangingDeletes::default());
    let config = QueueConfig {
        operation_timeout_ms: Some(100),
        ..Default::default()
    };
    let queue = Queue::with_config(store, config);
    let task_id = queue.create(sample_task("stuck")).await.unwrap();

    let err = queue.delete(task_id).await.unwrap_err();
    assert!(matches!(err, QueueError::TimedOut));
}

#[tokio::test]
async fn test_reads_unaffected_by_live_token() {
    let (_, queue) = memory_queue();
    let task_id = queue.create(sample_task("visible")).await.unwrap();

    let scoped = queue
        .with_cancellation(CancellationToken::new())
        .with_timeout(Duration::from_secs(5));
    let record = scoped.trace(task_id).await.unwrap().unwrap();
    assert_eq!(record.status, TaskStatus::Pending);
}
