//! Queue state machine.
//!
//! Every transition is the same three steps against the object store:
//!
//! 1. GET `{from}/{id}.json`
//! 2. PUT the mutated record at `{to}/{id}.json`
//! 3. DELETE `{from}/{id}.json`
//!
//! The store has no atomic rename, so a crash between 2 and 3 leaves the task
//! in both namespaces. Writing before deleting means the failure mode is
//! duplication, never loss. Callers reconcile with `trace`, `list` or
//! `find_duplicates`.
//!
//! With conditional writes the PUT is create-only and the DELETE carries the
//! entity tag from step 1. If the source was moved or rewritten in between,
//! the destination just written is stale: it is deleted again and the caller
//! gets `QueueError::Conflict`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{Namespaces, NewTask, Outcome, TaskRecord, TaskStatus};
use crate::storage::{ObjectStore, StorageError};

use super::codec;
use super::config::{ClaimGuarantee, QueueConfig};
use super::error::QueueError;

/// Source of timestamps for `createdAt`, `updatedAt` and friends.
pub trait Clock: std::fmt::Debug + Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time from the local system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The main queue interface.
///
/// A `Queue` holds nothing but a store handle and settings; it is cheap to
/// clone and safe to create per request. Two processes with their own `Queue`
/// over the same bucket see the same tasks.
///
/// # Concurrency
///
/// Unless conditional writes are in force (see [`Queue::guarantee`]), two
/// callers claiming the same pending task at the same moment can both
/// succeed. Handlers must tolerate running a task more than once. With
/// conditional writes, each pending copy of a task is claimed at most once;
/// a crash mid-transition can still leave duplicates for `find_duplicates`.
#[derive(Debug, Clone)]
pub struct Queue {
    store: Arc<dyn ObjectStore>,
    config: QueueConfig,
    namespaces: Namespaces,
    clock: Arc<dyn Clock>,
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
}

/// Per-operation guard racing every store call against cancellation and a deadline.
#[derive(Debug)]
pub(crate) struct Scope<'a> {
    cancel: Option<&'a CancellationToken>,
    deadline: Option<Instant>,
}

impl Scope<'_> {
    /// Runs one store call under the scope's cancellation token and deadline.
    pub(crate) async fn run<T, F>(&self, call: F) -> Result<T, QueueError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let bounded = async {
            match self.deadline {
                // timeout_at polls the call once before checking the deadline
                Some(deadline) if Instant::now() >= deadline => Err(QueueError::TimedOut),
                Some(deadline) => tokio::time::timeout_at(deadline, call)
                    .await
                    .map_err(|_| QueueError::TimedOut)?
                    .map_err(QueueError::from),
                None => call.await.map_err(QueueError::from),
            }
        };

        match self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(QueueError::Cancelled),
                    result = bounded => result,
                }
            }
            None => bounded.await,
        }
    }
}

impl Queue {
    /// Creates a new Queue over `store` with default config.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_config(store, QueueConfig::default())
    }

    /// Creates a new Queue over `store` with the given config.
    #[must_use]
    pub fn with_config(store: Arc<dyn ObjectStore>, config: QueueConfig) -> Self {
        let namespaces = Namespaces::new(config.prefix.clone());
        Self {
            store,
            config,
            namespaces,
            clock: Arc::new(SystemClock),
            cancel: None,
            deadline: None,
        }
    }

    /// Replaces the clock used for timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns a handle whose operations abort when `token` is cancelled.
    ///
    /// An aborted transition may already have written its destination and
    /// not yet deleted its source; no rollback is attempted.
    #[must_use]
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        let mut queue = self.clone();
        queue.cancel = Some(token);
        queue
    }

    /// Returns a handle whose operations fail with `QueueError::TimedOut`
    /// once `deadline` passes.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut queue = self.clone();
        queue.deadline = Some(deadline);
        queue
    }

    /// Shorthand for [`Self::with_deadline`] at `now + timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns the queue configuration.
    #[must_use]
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Returns the key layout.
    #[must_use]
    pub const fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// The claim guarantee in force for this queue and store.
    #[must_use]
    pub fn guarantee(&self) -> ClaimGuarantee {
        if self.conditional() {
            ClaimGuarantee::AtMostOnce
        } else {
            ClaimGuarantee::BestEffort
        }
    }

    /// Current time from the queue's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn conditional(&self) -> bool {
        self.config
            .claim_strategy
            .uses_conditional_writes(self.store.capabilities())
    }

    pub(crate) fn scope(&self) -> Scope<'_> {
        let configured = self
            .config
            .operation_timeout()
            .map(|timeout| Instant::now() + timeout);
        let deadline = match (self.deadline, configured) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Scope {
            cancel: self.cancel.as_ref(),
            deadline,
        }
    }

    /// Reads and decodes the task at `{status}/{id}.json`, if present.
    pub(crate) async fn fetch(
        &self,
        scope: &Scope<'_>,
        status: TaskStatus,
        task_id: Uuid,
    ) -> Result<Option<TaskRecord>, QueueError> {
        let key = self.namespaces.key_for(status, &task_id);
        match scope.run(self.store.get(&key)).await {
            Ok(body) => codec::decode_at(&body, status)
                .map(Some)
                .map_err(|e| QueueError::Decode(e.at(key))),
            Err(QueueError::Storage(StorageError::NotFound { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Reads the task at `{status}/{id}.json` with the entity tag it was read at.
    async fn fetch_versioned(
        &self,
        scope: &Scope<'_>,
        status: TaskStatus,
        task_id: Uuid,
    ) -> Result<Option<(TaskRecord, Option<String>)>, QueueError> {
        let key = self.namespaces.key_for(status, &task_id);
        match scope.run(self.store.get_versioned(&key)).await {
            Ok(object) => codec::decode_at(&object.body, status)
                .map(|record| Some((record, object.etag)))
                .map_err(|e| QueueError::Decode(e.at(key))),
            Err(QueueError::Storage(StorageError::NotFound { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Moves a task from `from` to `to`, applying `mutate` on the way.
    ///
    /// Returns `Ok(None)` if there is no object at `{from}/{id}.json`. The
    /// destination is written before the source is deleted; if the delete
    /// fails the error is returned and the task is left in both namespaces.
    async fn move_between<F>(
        &self,
        scope: &Scope<'_>,
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        mutate: F,
    ) -> Result<Option<TaskRecord>, QueueError>
    where
        F: FnOnce(&mut TaskRecord, DateTime<Utc>),
    {
        let Some((mut record, etag)) = self.fetch_versioned(scope, from, task_id).await? else {
            return Ok(None);
        };
        let conditional = self.conditional();

        let now = self.now();
        record.status = to;
        record.updated_at = now;
        mutate(&mut record, now);

        let body = codec::encode(&record)?;
        let source_key = self.namespaces.key_for(from, &task_id);
        let dest_key = self.namespaces.key_for(to, &task_id);

        let written = if conditional {
            scope.run(self.store.put_if_absent(&dest_key, body)).await
        } else {
            scope.run(self.store.put(&dest_key, body)).await
        };
        match written {
            Ok(()) => {}
            Err(QueueError::Storage(StorageError::AlreadyExists { .. })) => {
                counter!("stashq.transitions.conflict", "to" => to.namespace()).increment(1);
                return Err(QueueError::Conflict {
                    task_id,
                    status: to,
                });
            }
            Err(e) => return Err(e),
        }

        let removed = match etag.filter(|_| conditional) {
            Some(etag) => scope.run(self.store.delete_if_match(&source_key, &etag)).await,
            None => scope.run(self.store.delete(&source_key)).await,
        };
        if let Err(e) = removed {
            if matches!(
                e,
                QueueError::Storage(
                    StorageError::NotFound { .. } | StorageError::PreconditionFailed { .. }
                )
            ) {
                return Err(self
                    .discard_stale_write(scope, task_id, from, to, &dest_key)
                    .await);
            }
            tracing::warn!(
                task_id = %task_id,
                from = %from,
                to = %to,
                error = %e,
                "Transition wrote destination but failed to delete source; task is duplicated"
            );
            counter!("stashq.transitions.duplicated", "from" => from.namespace()).increment(1);
            return Err(e);
        }

        tracing::debug!(task_id = %task_id, from = %from, to = %to, "Task transitioned");
        Ok(Some(record))
    }

    /// Undoes a destination write whose source changed after it was read.
    async fn discard_stale_write(
        &self,
        scope: &Scope<'_>,
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        dest_key: &str,
    ) -> QueueError {
        counter!("stashq.transitions.conflict", "to" => to.namespace()).increment(1);
        if let Err(e) = scope.run(self.store.delete(dest_key)).await {
            tracing::warn!(
                task_id = %task_id,
                from = %from,
                to = %to,
                error = %e,
                "Source changed mid-transition and the stale destination could not be removed; task is duplicated"
            );
            counter!("stashq.transitions.duplicated", "from" => from.namespace()).increment(1);
            return e;
        }
        tracing::debug!(
            task_id = %task_id,
            from = %from,
            to = %to,
            "Source changed mid-transition; destination removed"
        );
        QueueError::Conflict {
            task_id,
            status: from,
        }
    }

    /// Submits a new task to the queue.
    ///
    /// Generates a fresh v4 UUID and writes a `Pending` record to
    /// `pending/{id}.json`. UUID collisions are not checked for.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Storage` if the write fails.
    pub async fn create(&self, input: NewTask) -> Result<Uuid, QueueError> {
        let scope = self.scope();
        let task_id = Uuid::new_v4();
        let record = TaskRecord::new(task_id, input, self.now());
        let body = codec::encode(&record)?;
        let key = self.namespaces.key_for(TaskStatus::Pending, &task_id);

        scope.run(self.store.put(&key, body)).await?;

        counter!("stashq.tasks.created", "function" => record.function_name.clone()).increment(1);
        tracing::info!(
            task_id = %task_id,
            function = %record.function_name,
            team = %record.team_name,
            "Task created"
        );
        Ok(task_id)
    }

    /// Claims a pending task, moving it to `Active` and setting `startedAt`.
    ///
    /// # Errors
    ///
    /// * `QueueError::NotFoundInStatus(Pending)` - The task is not pending
    /// * `QueueError::Conflict` - Another caller claimed it first (conditional writes only)
    /// * `QueueError::Storage` - Underlying storage error
    pub async fn claim(&self, task_id: Uuid) -> Result<TaskRecord, QueueError> {
        let scope = self.scope();
        let record = self
            .move_between(
                &scope,
                task_id,
                TaskStatus::Pending,
                TaskStatus::Active,
                |record, now| record.mark_started(now),
            )
            .await?
            .ok_or_else(|| QueueError::not_in_status(task_id, TaskStatus::Pending))?;

        counter!("stashq.tasks.claimed").increment(1);
        Ok(record)
    }

    /// Reports the outcome of an active task.
    ///
    /// Exit code 0 moves the task to `Completed`, anything else to `Failed`.
    /// `completedAt`, `exitCode`, `errorMessage` and `consoleOutput` are set
    /// from `outcome`.
    ///
    /// # Errors
    ///
    /// * `QueueError::NotFoundInStatus(Active)` - The task is not active
    /// * `QueueError::Conflict` - The destination already exists (conditional writes only)
    /// * `QueueError::Storage` - Underlying storage error
    pub async fn complete(&self, task_id: Uuid, outcome: Outcome) -> Result<TaskRecord, QueueError> {
        let scope = self.scope();
        let to = outcome.status();
        let record = self
            .move_between(&scope, task_id, TaskStatus::Active, to, |record, now| {
                record.mark_finished(&outcome, now);
            })
            .await?
            .ok_or_else(|| QueueError::not_in_status(task_id, TaskStatus::Active))?;

        if to == TaskStatus::Completed {
            counter!("stashq.tasks.completed").increment(1);
        } else {
            counter!("stashq.tasks.failed").increment(1);
        }
        Ok(record)
    }

    /// Cancels a pending or active task.
    ///
    /// `pending/` is probed before `active/`; the first hit is moved to
    /// `Cancelled`. If a crash left the task in both, only the pending copy
    /// is cancelled by this call.
    ///
    /// # Errors
    ///
    /// * `QueueError::NotFound` - The task is neither pending nor active
    /// * `QueueError::Storage` - Underlying storage error
    pub async fn cancel(&self, task_id: Uuid) -> Result<TaskRecord, QueueError> {
        let scope = self.scope();
        for from in [TaskStatus::Pending, TaskStatus::Active] {
            if let Some(record) = self
                .move_between(&scope, task_id, from, TaskStatus::Cancelled, |_, _| {})
                .await?
            {
                counter!("stashq.tasks.cancelled", "from" => from.namespace()).increment(1);
                tracing::info!(task_id = %task_id, from = %from, "Task cancelled");
                return Ok(record);
            }
        }
        Err(QueueError::not_found(task_id))
    }

    /// Sends a failed task back to `Pending`.
    ///
    /// Increments `retryCount` and clears `completedAt`, `exitCode`,
    /// `errorMessage` and `consoleOutput`. `startedAt` is kept.
    ///
    /// # Errors
    ///
    /// * `QueueError::NotFoundInStatus(Failed)` - The task is not failed
    /// * `QueueError::Conflict` - The task is already pending (conditional writes only)
    /// * `QueueError::Storage` - Underlying storage error
    pub async fn retry(&self, task_id: Uuid) -> Result<TaskRecord, QueueError> {
        let scope = self.scope();
        let record = self
            .move_between(
                &scope,
                task_id,
                TaskStatus::Failed,
                TaskStatus::Pending,
                |record, _| record.mark_retried(),
            )
            .await?
            .ok_or_else(|| QueueError::not_in_status(task_id, TaskStatus::Failed))?;

        counter!("stashq.tasks.retried").increment(1);
        tracing::info!(task_id = %task_id, retry_count = record.retry_count, "Task retried");
        Ok(record)
    }

    /// Deletes a task from whichever namespace holds it.
    ///
    /// Namespaces are probed in order (pending, active, completed, failed,
    /// cancelled) and only the first object found is removed. Deleting a task
    /// that does not exist is not an error. The object is not decoded, so
    /// corrupted records can be deleted too.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Storage` on storage failures other than not-found.
    pub async fn delete(&self, task_id: Uuid) -> Result<(), QueueError> {
        let scope = self.scope();
        for status in TaskStatus::ALL {
            let key = self.namespaces.key_for(*status, &task_id);
            match scope.run(self.store.get(&key)).await {
                Ok(_) => {
                    scope.run(self.store.delete(&key)).await?;
                    counter!("stashq.tasks.deleted", "status" => status.namespace()).increment(1);
                    tracing::info!(task_id = %task_id, status = %status, "Task deleted");
                    return Ok(());
                }
                Err(QueueError::Storage(StorageError::NotFound { .. })) => {}
                Err(e) => return Err(e),
            }
        }
        tracing::debug!(task_id = %task_id, "Delete of unknown task ignored");
        Ok(())
    }
}
