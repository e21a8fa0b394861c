//! Read-only views over the queue: trace, list and duplicate detection.
//!
//! Nothing here mutates the store. Reads fan out across namespaces and are
//! issued concurrently.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{TaskRecord, TaskStatus};
use crate::storage::StorageError;

use super::codec;
use super::error::QueueError;
use super::ops::Queue;

/// Filters for [`Queue::list_report`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Namespaces to read, in order. `None` reads all five.
    pub statuses: Option<Vec<TaskStatus>>,
    /// Stop after this many tasks.
    pub limit: Option<usize>,
}

impl ListOptions {
    /// Restrict the listing to `statuses`.
    #[must_use]
    pub fn statuses(mut self, statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    /// Cap the number of returned tasks.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A key the listing passed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedKey {
    pub key: String,
    pub reason: String,
}

/// Result of [`Queue::list_report`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListReport {
    pub tasks: Vec<TaskRecord>,
    pub skipped: Vec<SkippedKey>,
}

/// Flattened, display-oriented view of a task for status pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    pub task_id: Uuid,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<&'static str>,
    pub function_name: String,
    pub team_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_name: Option<String>,
    pub priority: i32,
    pub retry_count: u32,
    pub age_minutes: i64,
    /// True once a worker has reported an outcome.
    pub has_response: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TraceSummary {
    /// Builds the summary of `record` as seen at `now`.
    #[must_use]
    pub fn from_record(record: &TaskRecord, now: DateTime<Utc>) -> Self {
        Self {
            task_id: record.task_id,
            status: record.status,
            progress: (record.status == TaskStatus::Active).then_some("In progress"),
            function_name: record.function_name.clone(),
            team_name: record.team_name.clone(),
            machine_name: record.machine_name.clone(),
            bridge_name: record.bridge_name.clone(),
            priority: record.priority,
            retry_count: record.retry_count,
            age_minutes: record.age_minutes_at(now),
            has_response: matches!(record.status, TaskStatus::Completed | TaskStatus::Failed),
            exit_code: record.exit_code,
            console_output: record.console_output.clone(),
            last_failure_reason: record.error_message.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl Queue {
    /// Looks a task up across all namespaces.
    ///
    /// All five namespaces are read concurrently and the results are taken
    /// in order (pending, active, completed, failed, cancelled); the first
    /// decodable record wins. A task caught mid-transition in two namespaces
    /// is therefore reported at the earlier status.
    ///
    /// Returns `Ok(None)` if the task exists nowhere.
    ///
    /// # Errors
    ///
    /// * `QueueError::Storage` - A read failed before any record was found
    /// * `QueueError::Decode` - The task exists, but only as corrupted records
    pub async fn trace(&self, task_id: Uuid) -> Result<Option<TaskRecord>, QueueError> {
        let scope = self.scope();
        let probes = TaskStatus::ALL
            .iter()
            .map(|status| self.fetch(&scope, *status, task_id));
        let results = join_all(probes).await;

        let mut corrupt = None;
        for result in results {
            match result {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => {}
                Err(QueueError::Decode(e)) => {
                    tracing::warn!(task_id = %task_id, error = %e, "Skipping corrupted record");
                    corrupt.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        match corrupt {
            Some(e) => Err(QueueError::Decode(e)),
            None => Ok(None),
        }
    }

    /// Like [`Self::trace`], reshaped for display.
    ///
    /// # Errors
    ///
    /// Same as [`Self::trace`].
    pub async fn trace_summary(&self, task_id: Uuid) -> Result<Option<TraceSummary>, QueueError> {
        let now = self.now();
        Ok(self
            .trace(task_id)
            .await?
            .map(|record| TraceSummary::from_record(&record, now)))
    }

    /// Lists every task in every namespace.
    ///
    /// Corrupted records are left out; use [`Self::list_report`] to see them.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Storage` if listing or reading fails.
    pub async fn list(&self) -> Result<Vec<TaskRecord>, QueueError> {
        Ok(self.list_report(ListOptions::default()).await?.tasks)
    }

    /// Lists tasks, reporting the keys that could not be read as tasks.
    ///
    /// Each record is tagged with the status of the namespace it was found
    /// in. Within a namespace tasks come back in the store's listing order.
    /// Objects deleted between the listing and the read are dropped silently.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Storage` if listing or reading fails. A bad
    /// record never fails the whole listing.
    pub async fn list_report(&self, options: ListOptions) -> Result<ListReport, QueueError> {
        let scope = self.scope();
        let statuses = options.statuses.as_deref().unwrap_or(TaskStatus::ALL);
        let mut report = ListReport::default();

        for status in statuses {
            if options.limit.is_some_and(|limit| report.tasks.len() >= limit) {
                break;
            }

            let prefix = self.namespaces().prefix_for(*status);
            let keys = scope.run(self.store().list(&prefix)).await?;

            let mut wanted = Vec::new();
            for key in keys {
                if self.namespaces().parse_key(&key).is_some() {
                    wanted.push(key);
                } else {
                    report.skip(key, "not a task key");
                }
            }

            // Read only as many as the limit still allows, topping up from
            // the rest of the listing when some of them turn out unreadable.
            let mut wanted = wanted.into_iter();
            loop {
                let remaining = options
                    .limit
                    .map_or(usize::MAX, |limit| limit.saturating_sub(report.tasks.len()));
                let batch: Vec<String> = wanted.by_ref().take(remaining).collect();
                if batch.is_empty() {
                    break;
                }

                let bodies =
                    join_all(batch.iter().map(|key| scope.run(self.store().get(key)))).await;
                for (key, body) in batch.into_iter().zip(bodies) {
                    match body {
                        Ok(bytes) => match codec::decode_at(&bytes, *status) {
                            Ok(record) => report.tasks.push(record),
                            Err(e) => report.skip(key, e.reason),
                        },
                        Err(QueueError::Storage(StorageError::NotFound { .. })) => {
                            tracing::debug!(key = %key, "Task moved while listing");
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        Ok(report)
    }

    /// Finds tasks present in more than one namespace.
    ///
    /// These are left behind when a transition wrote its destination but
    /// never deleted its source. Only keys are listed; nothing is read.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Storage` if a listing fails.
    pub async fn find_duplicates(&self) -> Result<Vec<(Uuid, Vec<TaskStatus>)>, QueueError> {
        let scope = self.scope();
        let listings = join_all(TaskStatus::ALL.iter().map(|status| {
            let prefix = self.namespaces().prefix_for(*status);
            let scope = &scope;
            async move { scope.run(self.store().list(&prefix)).await }
        }))
        .await;

        let mut seen: BTreeMap<Uuid, Vec<TaskStatus>> = BTreeMap::new();
        for keys in listings {
            for key in keys? {
                if let Some((status, task_id)) = self.namespaces().parse_key(&key) {
                    seen.entry(task_id).or_default().push(status);
                }
            }
        }

        Ok(seen
            .into_iter()
            .filter(|(_, statuses)| statuses.len() > 1)
            .collect())
    }
}

impl ListReport {
    fn skip(&mut self, key: String, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(key = %key, reason = %reason, "Skipping unreadable key");
        counter!("stashq.list.skipped").increment(1);
        self.skipped.push(SkippedKey { key, reason });
    }
}
