//! Mapping between task status and object keys.
//!
//! Every task lives at exactly one key of the form
//! `{root}{status}/{task_id}.json`, where `root` is an optional queue prefix
//! (empty by default). Nothing else in the crate builds or parses keys.

use uuid::Uuid;

use super::task::TaskStatus;

/// File suffix of every task object.
pub const KEY_SUFFIX: &str = ".json";

/// All namespaces in probe order: pending, active, completed, failed, cancelled.
#[must_use]
pub const fn namespaces() -> &'static [TaskStatus] {
    TaskStatus::ALL
}

/// Returns the key for a task in the given status, with no queue prefix.
#[must_use]
pub fn key_for(status: TaskStatus, task_id: &Uuid) -> String {
    Namespaces::default().key_for(status, task_id)
}

/// Key layout for one queue, optionally rooted under a shared prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    root: String,
}

impl Namespaces {
    /// Creates a layout rooted at `root`. A trailing slash is added when missing;
    /// an empty root keeps keys at the bucket top level.
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        let mut root = root.into();
        while root.starts_with('/') {
            root.remove(0);
        }
        if !root.is_empty() && !root.ends_with('/') {
            root.push('/');
        }
        Self { root }
    }

    /// The normalized root prefix (empty or ending in `/`).
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Listing prefix for a namespace: `{root}{status}/`.
    #[must_use]
    pub fn prefix_for(&self, status: TaskStatus) -> String {
        format!("{}{}/", self.root, status.namespace())
    }

    /// Object key for a task: `{root}{status}/{task_id}.json`.
    #[must_use]
    pub fn key_for(&self, status: TaskStatus, task_id: &Uuid) -> String {
        format!("{}{}/{task_id}{KEY_SUFFIX}", self.root, status.namespace())
    }

    /// Inverse of [`Self::key_for`]. Returns `None` for keys outside this layout.
    #[must_use]
    pub fn parse_key(&self, key: &str) -> Option<(TaskStatus, Uuid)> {
        let rest = key.strip_prefix(self.root.as_str())?;
        let (segment, file) = rest.split_once('/')?;
        let status = TaskStatus::from_namespace(segment)?;
        let stem = file.strip_suffix(KEY_SUFFIX)?;
        if stem.contains('/') {
            return None;
        }
        // Only the lowercase hyphenated form that key_for writes
        let task_id = Uuid::try_parse(stem).ok()?;
        (task_id.hyphenated().to_string() == stem).then_some((status, task_id))
    }
}
