//! Test: list and trace across namespaces.

use stashq::models::{Outcome, TaskStatus};
use stashq::queue::{ListOptions, Queue, QueueConfig};
use stashq::storage::ObjectStore;
use uuid::Uuid;

use crate::common::{memory_queue, s3_queue, sample_task};

async fn check_list_after_creates(queue: &Queue) {
    let mut created = Vec::new();
    for i in 0..5 {
        created.push(queue.create(sample_task(&format!("list-{i}"))).await.unwrap());
    }

    let tasks = queue.list().await.expect("Failed to list");
    assert!(tasks.len() >= created.len());
    for task_id in &created {
        let task = tasks
            .iter()
            .find(|t| t.task_id == *task_id)
            .expect("created task missing from list");
        assert_eq!(task.status, TaskStatus::Pending);
    }
}

#[tokio::test]
async fn test_list_after_creates() {
    check_list_after_creates(&memory_queue().1).await;
}

#[tokio::test]
async fn test_list_spans_all_namespaces() {
    let (_, queue) = memory_queue();
    let pending = queue.create(sample_task("p")).await.unwrap();
    let active = queue.create(sample_task("a")).await.unwrap();
    let completed = queue.create(sample_task("c")).await.unwrap();
    let failed = queue.create(sample_task("f")).await.unwrap();
    let cancelled = queue.create(sample_task("x")).await.unwrap();

    for id in [active, completed, failed] {
        queue.claim(id).await.unwrap();
    }
    queue.complete(completed, Outcome::success()).await.unwrap();
    queue.complete(failed, Outcome::failure(1, "no")).await.unwrap();
    queue.cancel(cancelled).await.unwrap();

    let tasks = queue.list().await.unwrap();
    assert_eq!(tasks.len(), 5);
    let status_of = |id: Uuid| tasks.iter().find(|t| t.task_id == id).unwrap().status;
    assert_eq!(status_of(pending), TaskStatus::Pending);
    assert_eq!(status_of(active), TaskStatus::Active);
    assert_eq!(status_of(completed), TaskStatus::Completed);
    assert_eq!(status_of(failed), TaskStatus::Failed);
    assert_eq!(status_of(cancelled), TaskStatus::Cancelled);

    let finished = queue
        .list_report(
            ListOptions::default().statuses([TaskStatus::Completed, TaskStatus::Failed]),
        )
        .await
        .unwrap();
    assert_eq!(finished.tasks.len(), 2);
    assert!(finished.tasks.iter().all(|t| t.is_terminal()));
}

#[tokio::test]
async fn test_list_survives_corrupt_records() {
    let (store, queue) = memory_queue();
    let good = queue.create(sample_task("good")).await.unwrap();
    let corrupt = Uuid::new_v4();
    store
        .put(&format!("failed/{corrupt}.json"), b"\x00\x01not json".to_vec())
        .await
        .unwrap();
    store
        .put("active/notes/readme.json", b"{}".to_vec())
        .await
        .unwrap();

    let tasks = queue.list().await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_id, good);

    let report = queue.list_report(ListOptions::default()).await.unwrap();
    assert_eq!(report.skipped.len(), 2);
    assert!(report
        .skipped
        .iter()
        .any(|s| s.key == format!("failed/{corrupt}.json")));
}

#[tokio::test]
async fn test_queues_under_different_prefixes_are_isolated() {
    let (store, default_queue) = memory_queue();
    let staging = Queue::with_config(
        store.clone(),
        QueueConfig {
            prefix: "staging".to_string(),
            ..Default::default()
        },
    );

    let a = default_queue.create(sample_task("a")).await.unwrap();
    let b = staging.create(sample_task("b")).await.unwrap();

    assert!(staging.trace(a).await.unwrap().is_none());
    assert!(default_queue.trace(b).await.unwrap().is_none());

    let staged = staging.list().await.unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].task_id, b);

    // The bucket-root queue does not pick up `staging/...` keys
    let root = default_queue.list_report(ListOptions::default()).await.unwrap();
    assert_eq!(root.tasks.len(), 1);
    assert!(root.skipped.is_empty());
    assert!(store.keys().await.contains(&format!("staging/pending/{b}.json")));
}

#[tokio::test]
async fn test_trace_summary_matches_trace() {
    let (_, queue) = memory_queue();
    let task_id = queue
        .create(sample_task("summary").machine_name("kvm-7"))
        .await
        .unwrap();
    queue.claim(task_id).await.unwrap();

    let record = queue.trace(task_id).await.unwrap().unwrap();
    let summary = queue.trace_summary(task_id).await.unwrap().unwrap();
    assert_eq!(summary.task_id, record.task_id);
    assert_eq!(summary.status, TaskStatus::Active);
    assert_eq!(summary.progress, Some("In progress"));
    assert_eq!(summary.machine_name.as_deref(), Some("kvm-7"));
    assert!(summary.age_minutes >= 0);

    assert!(queue.trace_summary(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
#[cfg_attr(
    not(feature = "integration"),
    ignore = "requires S3 (enable feature integration)"
)]
async fn test_s3_list_after_creates() {
    let queue = s3_queue().await;
    check_list_after_creates(&queue).await;

    let limited = queue
        .list_report(ListOptions::default().limit(2))
        .await
        .unwrap();
    assert_eq!(limited.tasks.len(), 2);
}
