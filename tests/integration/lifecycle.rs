//! Test: task lifecycle transitions.
//!
//! Each check runs against the in-memory store, and against S3 when the
//! `integration` feature is enabled.

use serde_json::json;
use stashq::models::{Outcome, TaskStatus};
use stashq::queue::{Queue, QueueError};
use uuid::Uuid;

use crate::common::{memory_queue, s3_queue, sample_task};

async fn check_create_then_trace(queue: &Queue) {
    let task_id = queue
        .create(sample_task("machine_ping").priority(1).bridge_name("bridge-a"))
        .await
        .expect("Failed to create task");

    assert_eq!(task_id.get_version_num(), 4);

    let record = queue
        .trace(task_id)
        .await
        .expect("Failed to trace task")
        .expect("Task not found");
    assert_eq!(record.task_id, task_id);
    assert_eq!(record.status, TaskStatus::Pending);
    assert_eq!(record.retry_count, 0);
    assert_eq!(record.priority, 1);
    assert_eq!(record.bridge_name.as_deref(), Some("bridge-a"));
    assert_eq!(record.updated_at, record.created_at);
    assert!(record.started_at.is_none());
}

async fn check_claim(queue: &Queue) {
    let task_id = queue.create(sample_task("claim")).await.unwrap();

    let claimed = queue.claim(task_id).await.expect("Failed to claim");
    assert_eq!(claimed.status, TaskStatus::Active);
    let started = claimed.started_at.expect("startedAt not set");
    assert!(started >= claimed.created_at);

    let traced = queue.trace(task_id).await.unwrap().unwrap();
    assert_eq!(traced.status, TaskStatus::Active);

    let err = queue.claim(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::NotFoundInStatus {
            expected: TaskStatus::Pending,
            ..
        }
    ));
}

async fn check_complete(queue: &Queue) {
    let ok_id = queue.create(sample_task("ok")).await.unwrap();
    queue.claim(ok_id).await.unwrap();
    let done = queue.complete(ok_id, Outcome::success()).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.exit_code, Some(0));
    assert!(done.completed_at.is_some());

    let bad_id = queue.create(sample_task("bad")).await.unwrap();
    queue.claim(bad_id).await.unwrap();
    let failed = queue
        .complete(
            bad_id,
            Outcome::failure(1, "connection refused").with_console_output("$ ping\ntimeout\n"),
        )
        .await
        .unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.exit_code, Some(1));
    assert_eq!(failed.error_message.as_deref(), Some("connection refused"));
    assert_eq!(failed.console_output.as_deref(), Some("$ ping\ntimeout\n"));

    let traced = queue.trace(bad_id).await.unwrap().unwrap();
    assert_eq!(traced, failed);

    let pending_id = queue.create(sample_task("never-claimed")).await.unwrap();
    let err = queue.complete(pending_id, Outcome::success()).await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::NotFoundInStatus {
            expected: TaskStatus::Active,
            ..
        }
    ));
}

async fn check_cancel(queue: &Queue) {
    let pending_id = queue.create(sample_task("cancel-pending")).await.unwrap();
    let cancelled = queue.cancel(pending_id).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);

    let active_id = queue.create(sample_task("cancel-active")).await.unwrap();
    queue.claim(active_id).await.unwrap();
    let cancelled = queue.cancel(active_id).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert!(cancelled.started_at.is_some());

    // Terminal tasks cannot be cancelled
    let err = queue.cancel(active_id).await.unwrap_err();
    assert!(matches!(err, QueueError::NotFound { task_id } if task_id == active_id));
}

async fn check_full_round_trip(queue: &Queue) {
    let task_id = queue
        .create(sample_task("flaky").params(json!({"attempts": 2})))
        .await
        .unwrap();

    queue.claim(task_id).await.unwrap();
    queue
        .complete(task_id, Outcome::failure(2, "disk full").with_console_output("err"))
        .await
        .unwrap();

    let retried = queue.retry(task_id).await.unwrap();
    assert_eq!(retried.status, TaskStatus::Pending);
    assert_eq!(retried.retry_count, 1);
    assert!(retried.exit_code.is_none());
    assert!(retried.error_message.is_none());
    assert!(retried.completed_at.is_none());

    queue.claim(task_id).await.unwrap();
    let done = queue.complete(task_id, Outcome::success()).await.unwrap();

    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.retry_count, 1);
    assert_eq!(done.exit_code, Some(0));
    assert!(done.error_message.is_none());
    assert!(done.console_output.is_none());
    assert_eq!(done.params, Some(json!({"attempts": 2})));
    assert_eq!(done.vault_content, "{\"credentials\":\"opaque\"}");
}

async fn check_delete(queue: &Queue) {
    let task_id = queue.create(sample_task("delete")).await.unwrap();
    queue.claim(task_id).await.unwrap();

    queue.delete(task_id).await.expect("Failed to delete");
    assert!(queue.trace(task_id).await.unwrap().is_none());

    // Second delete is a no-op
    queue.delete(task_id).await.expect("Second delete should succeed");
}

async fn check_trace_unknown(queue: &Queue) {
    assert!(queue.trace(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_then_trace() {
    check_create_then_trace(&memory_queue().1).await;
}

#[tokio::test]
async fn test_claim() {
    check_claim(&memory_queue().1).await;
}

#[tokio::test]
async fn test_complete() {
    check_complete(&memory_queue().1).await;
}

#[tokio::test]
async fn test_cancel() {
    check_cancel(&memory_queue().1).await;
}

#[tokio::test]
async fn test_full_round_trip() {
    check_full_round_trip(&memory_queue().1).await;
}

#[tokio::test]
async fn test_delete() {
    check_delete(&memory_queue().1).await;
}

#[tokio::test]
async fn test_trace_unknown() {
    check_trace_unknown(&memory_queue().1).await;
}

#[tokio::test]
async fn test_retry_only_from_failed() {
    let (_, queue) = memory_queue();
    let task_id = queue.create(sample_task("retry")).await.unwrap();

    let err = queue.retry(task_id).await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::NotFoundInStatus {
            expected: TaskStatus::Failed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_each_step_leaves_one_object() {
    let (store, queue) = memory_queue();
    let task_id = queue.create(sample_task("steps")).await.unwrap();
    assert_eq!(store.keys().await, vec![format!("pending/{task_id}.json")]);

    queue.claim(task_id).await.unwrap();
    assert_eq!(store.keys().await, vec![format!("active/{task_id}.json")]);

    queue.complete(task_id, Outcome::failure(9, "x")).await.unwrap();
    assert_eq!(store.keys().await, vec![format!("failed/{task_id}.json")]);

    queue.retry(task_id).await.unwrap();
    assert_eq!(store.keys().await, vec![format!("pending/{task_id}.json")]);

    queue.cancel(task_id).await.unwrap();
    assert_eq!(store.keys().await, vec![format!("cancelled/{task_id}.json")]);
}

#[tokio::test]
#[cfg_attr(
    not(feature = "integration"),
    ignore = "requires S3 (enable feature integration)"
)]
async fn test_s3_lifecycle() {
    let queue = s3_queue().await;
    check_create_then_trace(&queue).await;
    check_claim(&queue).await;
    check_complete(&queue).await;
    check_cancel(&queue).await;
    check_full_round_trip(&queue).await;
    check_delete(&queue).await;
    check_trace_unknown(&queue).await;
}
