use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Priority assigned when the producer does not supply one.
pub const DEFAULT_PRIORITY: i32 = 3;

/// Represents the status of a task in the queue.
///
/// The status is never authoritative on its own: a task's status is the
/// namespace its object currently lives under. The field embedded in the
/// stored JSON is kept in sync with that placement on every write.
///
/// Tasks progress through states: `Pending` -> `Active` -> `Completed`/`Failed`.
/// `Failed` tasks can be sent back to `Pending` via retry, and `Pending` or
/// `Active` tasks can be `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Task is waiting to be claimed by a worker.
    Pending,
    /// Task has been claimed and is being executed.
    Active,
    /// Task finished with exit code 0.
    Completed,
    /// Task finished with a non-zero exit code.
    Failed,
    /// Task was cancelled before it finished.
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    /// All statuses, in the order namespaces are probed.
    pub const ALL: &'static [Self] = &[
        Self::Pending,
        Self::Active,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Display name for humans.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Active => "Active",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// The value stored in the `status` field of the task JSON.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// The key prefix (without trailing slash) holding tasks in this status.
    #[must_use]
    pub const fn namespace(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true for statuses no transition leaves (except `retry` out of `Failed`).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Parses a namespace segment (`pending`, `active`, ...).
    #[must_use]
    pub fn from_namespace(segment: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.namespace() == segment)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_namespace(&s.to_ascii_lowercase()).ok_or_else(|| {
            format!("unknown status '{s}' (expected pending, active, completed, failed, or cancelled)")
        })
    }
}

/// Input supplied by a producer when creating a task.
///
/// Everything here is copied verbatim into the stored record and never
/// changed by the queue afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTask {
    /// Name of the function the worker should run.
    pub function_name: String,
    /// Team that owns the task.
    pub team_name: String,
    /// Opaque vault payload; the queue never inspects or rewrites it.
    pub vault_content: String,
    /// Caller-supplied priority (default: 3). Preserved, not used for ordering.
    pub priority: Option<i32>,
    /// Target machine, if any.
    pub machine_name: Option<String>,
    /// Bridge that should pick the task up, if any.
    pub bridge_name: Option<String>,
    /// Free-form function parameters.
    pub params: Option<Value>,
}

impl NewTask {
    /// Creates a new task input with the required fields.
    #[must_use]
    pub fn new(
        function_name: impl Into<String>,
        team_name: impl Into<String>,
        vault_content: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            team_name: team_name.into(),
            vault_content: vault_content.into(),
            ..Default::default()
        }
    }

    /// Sets the priority.
    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the target machine.
    #[must_use]
    pub fn machine_name(mut self, machine_name: impl Into<String>) -> Self {
        self.machine_name = Some(machine_name.into());
        self
    }

    /// Sets the bridge.
    #[must_use]
    pub fn bridge_name(mut self, bridge_name: impl Into<String>) -> Self {
        self.bridge_name = Some(bridge_name.into());
        self
    }

    /// Sets the function parameters.
    #[allow(clippy::missing_const_for_fn)]
    #[must_use]
    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// Result of one execution attempt, reported through `complete`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Process exit code. Zero means success.
    pub exit_code: i32,
    /// Error message, usually only set on failure.
    pub error_message: Option<String>,
    /// Captured console output.
    pub console_output: Option<String>,
}

impl Outcome {
    /// A successful outcome (exit code 0).
    #[must_use]
    pub const fn success() -> Self {
        Self {
            exit_code: 0,
            error_message: None,
            console_output: None,
        }
    }

    /// A failed outcome with the given exit code and message.
    #[must_use]
    pub fn failure(exit_code: i32, error_message: impl Into<String>) -> Self {
        Self {
            exit_code,
            error_message: Some(error_message.into()),
            console_output: None,
        }
    }

    /// Attaches captured console output.
    #[must_use]
    pub fn with_console_output(mut self, output: impl Into<String>) -> Self {
        self.console_output = Some(output.into());
        self
    }

    /// The status a task lands in after this outcome.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        if self.exit_code == 0 {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        }
    }
}

/// A task record, exactly as stored under `{status}/{task_id}.json`.
///
/// Decoding goes through [`crate::queue::codec`], which applies schema
/// defaults; this type only derives `Serialize`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Unique identifier, assigned at creation.
    pub task_id: Uuid,

    /// Mirrors the namespace the object lives in.
    pub status: TaskStatus,

    /// Name of the function the worker should run.
    pub function_name: String,

    /// Team that owns the task.
    pub team_name: String,

    /// Opaque vault payload.
    pub vault_content: String,

    /// Caller-supplied priority, preserved verbatim.
    pub priority: i32,

    /// Number of times the task left `Failed` via retry.
    pub retry_count: u32,

    /// Target machine, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,

    /// Bridge that should pick the task up, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_name: Option<String>,

    /// Free-form function parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Timestamp when the task was created.
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last transition that rewrote the object.
    pub updated_at: DateTime<Utc>,

    /// Set on each claim; not cleared by later transitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set on completion, cleared by retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Exit code of the last attempt, cleared by retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Error message of the last attempt, cleared by retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Console output of the last attempt, cleared by retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_output: Option<String>,
}

impl TaskRecord {
    /// Builds a fresh `Pending` record from producer input.
    #[must_use]
    pub fn new(task_id: Uuid, input: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            function_name: input.function_name,
            team_name: input.team_name,
            vault_content: input.vault_content,
            priority: input.priority.unwrap_or(DEFAULT_PRIORITY),
            retry_count: 0,
            machine_name: input.machine_name,
            bridge_name: input.bridge_name,
            params: input.params,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            exit_code: None,
            error_message: None,
            console_output: None,
        }
    }

    /// Applies the claim mutation: records when execution started.
    pub fn mark_started(&mut self, now: DateTime<Utc>) {
        self.started_at = Some(now);
    }

    /// Applies the completion mutation: stores the attempt's outcome.
    pub fn mark_finished(&mut self, outcome: &Outcome, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        self.exit_code = Some(outcome.exit_code);
        self.error_message.clone_from(&outcome.error_message);
        self.console_output.clone_from(&outcome.console_output);
    }

    /// Applies the retry mutation: bumps the counter and drops the
    /// previous attempt's outcome.
    pub fn mark_retried(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.completed_at = None;
        self.exit_code = None;
        self.error_message = None;
        self.console_output = None;
    }

    /// Returns true if the task is in a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whole minutes elapsed since creation.
    #[must_use]
    pub fn age_minutes_at(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_minutes()
    }
}
