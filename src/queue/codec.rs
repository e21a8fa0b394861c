//! Task record codec.
//!
//! Records are stored as camelCase JSON. Decoding is lenient about fields
//! older writers may have left out (`retryCount`, `priority`, `updatedAt`)
//! and strict about everything that identifies the task.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{TaskRecord, TaskStatus, DEFAULT_PRIORITY};
use crate::storage::StorageError;

/// A stored object could not be decoded as a task record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid task record{}: {reason}", located_at(.key.as_deref()))]
pub struct DecodeError {
    /// Key of the offending object, when known.
    pub key: Option<String>,
    /// Why decoding failed.
    pub reason: String,
}

impl DecodeError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            key: None,
            reason: reason.into(),
        }
    }

    /// Attaches the object key the bytes came from.
    #[must_use]
    pub fn at(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

fn located_at(key: Option<&str>) -> String {
    key.map(|key| format!(" at '{key}'")).unwrap_or_default()
}

/// On-disk shape, with defaults for fields that may be missing.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    task_id: Uuid,
    #[serde(default)]
    status: Option<TaskStatus>,
    function_name: String,
    team_name: String,
    #[serde(default)]
    vault_content: String,
    #[serde(default = "default_priority")]
    priority: i32,
    #[serde(default)]
    retry_count: u32,
    #[serde(default)]
    machine_name: Option<String>,
    #[serde(default)]
    bridge_name: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    exit_code: Option<i32>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    console_output: Option<String>,
}

const fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

impl StoredRecord {
    fn into_record(self, status: TaskStatus) -> TaskRecord {
        TaskRecord {
            task_id: self.task_id,
            status,
            function_name: self.function_name,
            team_name: self.team_name,
            vault_content: self.vault_content,
            priority: self.priority,
            retry_count: self.retry_count,
            machine_name: self.machine_name,
            bridge_name: self.bridge_name,
            params: self.params,
            created_at: self.created_at,
            updated_at: self.updated_at.unwrap_or(self.created_at),
            started_at: self.started_at,
            completed_at: self.completed_at,
            exit_code: self.exit_code,
            error_message: self.error_message,
            console_output: self.console_output,
        }
    }
}

/// Serializes a record for storage.
///
/// # Errors
///
/// Returns `StorageError::SerializationError` if `params` holds something
/// JSON cannot represent.
pub fn encode(record: &TaskRecord) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(record).map_err(|e| StorageError::SerializationError(e.to_string()))
}

/// Deserializes a record, trusting its embedded `status` field.
///
/// # Errors
///
/// Returns `DecodeError` for malformed JSON, missing required fields, or a
/// missing `status`.
pub fn decode(bytes: &[u8]) -> Result<TaskRecord, DecodeError> {
    let stored = parse(bytes)?;
    let status = stored
        .status
        .ok_or_else(|| DecodeError::new("missing field `status`"))?;
    Ok(stored.into_record(status))
}

/// Deserializes a record found under `status`'s namespace.
///
/// Placement is the source of truth: the embedded `status` field is replaced
/// by `status`, and may be absent altogether.
///
/// # Errors
///
/// Returns `DecodeError` for malformed JSON or missing required fields.
pub fn decode_at(bytes: &[u8], status: TaskStatus) -> Result<TaskRecord, DecodeError> {
    let stored = parse(bytes)?;
    if let Some(embedded) = stored.status {
        if embedded != status {
            tracing::debug!(
                task_id = %stored.task_id,
                embedded = %embedded,
                namespace = %status,
                "Embedded status disagrees with namespace; namespace wins"
            );
        }
    }
    Ok(stored.into_record(status))
}

fn parse(bytes: &[u8]) -> Result<StoredRecord, DecodeError> {
    serde_json::from_slice(bytes).map_err(|e| DecodeError::new(e.to_string()))
}
