//! Test: interrupted transitions duplicate tasks and never lose them.

use stashq::models::{Outcome, TaskStatus};
use stashq::queue::{ListOptions, QueueError};
use stashq::storage::StorageError;

use crate::common::{memory_queue, sample_task};

#[tokio::test]
async fn test_failed_delete_after_write_duplicates() {
    let (store, queue) = memory_queue();
    let task_id = queue.create(sample_task("crash")).await.unwrap();

    store.fail_next_deletes(1);
    let err = queue.claim(task_id).await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::Storage(StorageError::ConnectionError(_))
    ));
    assert!(err.may_have_partially_applied());

    // Both copies are visible
    assert_eq!(store.len().await, 2);
    let duplicates = queue.find_duplicates().await.unwrap();
    assert_eq!(
        duplicates,
        vec![(task_id, vec![TaskStatus::Pending, TaskStatus::Active])]
    );

    // list reports both, each tagged with its namespace
    let tasks = queue.list().await.unwrap();
    let mut statuses: Vec<_> = tasks.iter().map(|t| t.status).collect();
    statuses.sort();
    assert_eq!(statuses, vec![TaskStatus::Pending, TaskStatus::Active]);
}

#[tokio::test]
async fn test_every_transition_duplicates_on_failed_delete() {
    let (store, queue) = memory_queue();

    // complete
    let task_id = queue.create(sample_task("complete")).await.unwrap();
    queue.claim(task_id).await.unwrap();
    store.fail_next_deletes(1);
    assert!(queue.complete(task_id, Outcome::failure(1, "x")).await.is_err());
    assert_eq!(
        queue.find_duplicates().await.unwrap(),
        vec![(task_id, vec![TaskStatus::Active, TaskStatus::Failed])]
    );

    // Clean up the stale active copy, then retry with a failing delete
    queue.delete(task_id).await.unwrap();
    store.fail_next_deletes(1);
    assert!(queue.retry(task_id).await.is_err());
    assert_eq!(
        queue.find_duplicates().await.unwrap(),
        vec![(task_id, vec![TaskStatus::Pending, TaskStatus::Failed])]
    );
}

#[tokio::test]
async fn test_duplicate_can_be_reconciled() {
    let (store, queue) = memory_queue();
    let task_id = queue.create(sample_task("reconcile")).await.unwrap();
    store.fail_next_deletes(1);
    assert!(queue.claim(task_id).await.is_err());

    // trace reports the earlier namespace; delete removes it first
    assert_eq!(
        queue.trace(task_id).await.unwrap().unwrap().status,
        TaskStatus::Pending
    );
    queue.delete(task_id).await.unwrap();

    assert!(queue.find_duplicates().await.unwrap().is_empty());
    let record = queue.trace(task_id).await.unwrap().unwrap();
    assert_eq!(record.status, TaskStatus::Active);

    let done = queue.complete(task_id, Outcome::success()).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(store.keys().await, vec![format!("completed/{task_id}.json")]);
}

#[tokio::test]
async fn test_no_partial_state_on_clean_run() {
    let (_, queue) = memory_queue();
    for i in 0..10 {
        let task_id = queue.create(sample_task(&format!("t{i}"))).await.unwrap();
        if i % 2 == 0 {
            queue.claim(task_id).await.unwrap();
        }
    }

    assert!(queue.find_duplicates().await.unwrap().is_empty());
    let active = queue
        .list_report(ListOptions::default().statuses([TaskStatus::Active]))
        .await
        .unwrap();
    assert_eq!(active.tasks.len(), 5);
}
