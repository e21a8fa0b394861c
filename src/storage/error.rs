use thiserror::Error;

/// Errors that can occur when talking to the object store.
///
/// The queue never retries or wraps these; they reach the caller as-is so it
/// can apply its own backoff policy.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The requested object was not found (HTTP 404).
    #[error("Object not found: {key}")]
    NotFound {
        /// The key of the object that was not found.
        key: String,
    },

    /// A create-only write hit an existing object (`If-None-Match: *` returned 412).
    #[error("Object already exists: {key}")]
    AlreadyExists {
        /// The key of the object that already exists.
        key: String,
    },

    /// A conditional request failed for a reason other than existence (HTTP 412).
    #[error("Precondition failed for object: {key}")]
    PreconditionFailed {
        /// The key of the object for which the precondition failed.
        key: String,
    },

    /// Failed to connect to the S3 endpoint.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Failed to serialize data before writing it.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid or unsupported configuration.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Access denied (HTTP 403).
    #[error("Access denied to bucket '{bucket}'")]
    AccessDenied {
        /// The bucket that access was denied to.
        bucket: String,
    },

    /// Catch-all for other S3 errors, including throttling.
    #[error("S3 error: {0}")]
    S3Error(String),
}

impl StorageError {
    /// Returns true if this error means the object does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns a helpful suggestion for resolving this error.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => {
                "The object may have been moved to another status or deleted. \
                 Use `stashq trace <id>` to find where the task lives now."
            }
            Self::AlreadyExists { .. } => {
                "Another caller wrote this key first. With conditional writes enabled \
                 this means a concurrent transition won the race for this task."
            }
            Self::PreconditionFailed { .. } => {
                "Another process modified this object between your read and write. \
                 This is normal in high-concurrency environments."
            }
            Self::ConnectionError(_) => {
                "Check that your S3 endpoint is correct and the service is running. \
                 For local development, ensure the S3-compatible service is started \
                 (e.g., docker compose up -d). Verify network connectivity \
                 with: curl <your-endpoint>"
            }
            Self::SerializationError(_) => {
                "The task record could not be serialized. This usually indicates \
                 a non-JSON value in the task parameters."
            }
            Self::ConfigurationError(_) => {
                "Check your configuration settings. Common issues include: \
                 enabling conditional writes on a store that does not support them, \
                 an invalid region, or an incorrect bucket name."
            }
            Self::AccessDenied { .. } => {
                "Check that AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY are set correctly. \
                 Verify the credentials have permission to access this bucket. \
                 Check the bucket policy allows your IAM user/role."
            }
            Self::S3Error(_) => {
                "An unexpected S3 error occurred. Check the error message for details \
                 and verify your S3 configuration is correct."
            }
        }
    }

    /// Returns a richly formatted error message with context and suggestions.
    ///
    /// This format is designed for CLI output.
    #[must_use]
    pub fn display_rich(&self) -> String {
        format!("Error: {}\n\nSuggestion:\n  {}", self, self.suggestion())
    }
}
