//! Queue configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::StoreCapabilities;

/// How transitions guard their destination write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStrategy {
    /// Plain writes. Two callers racing on the same task can both succeed.
    BestEffort,
    /// Create-only writes and entity-tag guarded deletes. The loser of a
    /// race gets `QueueError::Conflict`. Requires a store with
    /// conditional-write support.
    Conditional,
    /// `Conditional` when the store supports it, `BestEffort` otherwise.
    #[default]
    Auto,
}

impl ClaimStrategy {
    /// Resolves the strategy against what the store can actually do.
    #[must_use]
    pub const fn uses_conditional_writes(self, caps: StoreCapabilities) -> bool {
        match self {
            Self::BestEffort => false,
            Self::Conditional => true,
            Self::Auto => caps.conditional_writes,
        }
    }
}

impl FromStr for ClaimStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "best_effort" => Ok(Self::BestEffort),
            "conditional" => Ok(Self::Conditional),
            "auto" => Ok(Self::Auto),
            other => Err(format!(
                "unknown claim strategy '{other}' (expected best-effort, conditional, or auto)"
            )),
        }
    }
}

/// The guarantee a queue gives two callers claiming the same task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimGuarantee {
    /// Each pending copy of a task is claimed by at most one caller; the
    /// rest get `QueueError::Conflict`. Relies on create-only PUTs and
    /// `If-Match` DELETEs. A transition interrupted between its write and
    /// delete can still leave a duplicate copy behind.
    AtMostOnce,
    /// Both callers may succeed if their reads interleave.
    BestEffort,
}

/// Queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Key prefix under which the five status namespaces live (default: bucket root).
    #[serde(default)]
    pub prefix: String,

    /// Destination-write strategy for transitions.
    #[serde(default)]
    pub claim_strategy: ClaimStrategy,

    /// Deadline applied to every operation, in milliseconds (default: none).
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            claim_strategy: ClaimStrategy::Auto,
            operation_timeout_ms: None,
        }
    }
}

impl QueueConfig {
    /// The per-operation deadline, if one is configured.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    /// Validate the configuration against the store it will run on.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is zero, the prefix contains empty
    /// path segments, or `Conditional` is requested on a store without
    /// conditional writes.
    pub fn validate(&self, caps: StoreCapabilities) -> Result<(), String> {
        if self.operation_timeout_ms == Some(0) {
            return Err("operation_timeout_ms must be greater than 0".to_string());
        }
        if self.prefix.trim_matches('/').contains("//") {
            return Err(format!(
                "prefix '{}' contains an empty path segment",
                self.prefix
            ));
        }
        if self.claim_strategy == ClaimStrategy::Conditional && !caps.conditional_writes {
            return Err(
                "claim_strategy 'conditional' requires a store with conditional writes"
                    .to_string(),
            );
        }
        Ok(())
    }
}
