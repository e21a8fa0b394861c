//! Building a `Queue` from configuration.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{load_config, ConfigError, StashqConfig};
use crate::storage::{ObjectStore, S3Client, S3Config, StorageError};

use super::ops::Queue;

/// Options for connecting to a queue. Set fields take priority over the
/// environment and config files.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// S3 endpoint URL (for S3-compatible services).
    pub endpoint: Option<String>,
    /// S3 bucket name.
    pub bucket: Option<String>,
    /// AWS region.
    pub region: Option<String>,
    /// Key prefix of the queue inside the bucket.
    pub prefix: Option<String>,
    /// Claim strategy name (`best_effort`, `conditional`, `auto`).
    pub claim_strategy: Option<String>,
    /// Per-operation timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Config profile to resolve.
    pub profile: Option<String>,
    /// Extra config file, above the project and user files.
    pub config_path: Option<PathBuf>,
}

impl ConnectOptions {
    /// Writes the set fields over `config`.
    pub fn apply(&self, config: &mut StashqConfig) {
        if let Some(ref endpoint) = self.endpoint {
            config.endpoint = Some(endpoint.clone()).filter(|s| !s.is_empty());
        }
        if let Some(ref bucket) = self.bucket {
            config.bucket.clone_from(bucket);
        }
        if let Some(ref region) = self.region {
            config.region.clone_from(region);
        }
        if self.prefix.is_some() {
            config.queue.prefix.clone_from(&self.prefix);
        }
        if self.claim_strategy.is_some() {
            config.queue.claim_strategy.clone_from(&self.claim_strategy);
        }
        if self.timeout_ms.is_some() {
            config.queue.timeout_ms = self.timeout_ms;
        }
    }
}

/// Error type for connection failures.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Bucket not configured in flags, env vars or config file.
    #[error("bucket not configured - set S3_BUCKET env var or add to .stashq.toml")]
    MissingBucket,
    /// Config file present but unreadable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Queue settings that cannot be used.
    #[error("invalid queue configuration: {0}")]
    InvalidConfig(String),
    /// S3 client setup failed.
    #[error("S3 error: {0}")]
    Storage(#[from] StorageError),
}

/// Connect to a queue with automatic config resolution.
///
/// Config priority (highest to lowest):
/// 1. Provided options
/// 2. Environment variables (`S3_ENDPOINT`, `S3_BUCKET`, `S3_REGION`, `STASHQ_*`)
/// 3. Config files (`--config`, `.stashq.toml`, `~/.config/stashq/config.toml`)
///
/// # Example
///
/// ```no_run
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use stashq::queue::{connect, ConnectOptions};
///
/// let queue = connect(ConnectOptions {
///     bucket: Some("my-bucket".to_string()),
///     ..Default::default()
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns `ConnectError` if config files cannot be parsed, the bucket is
/// missing, or the queue settings do not fit the store.
pub async fn connect(options: ConnectOptions) -> Result<Queue, ConnectError> {
    let mut config = load_config(options.profile.as_deref(), options.config_path.as_ref())?;
    options.apply(&mut config);
    open(&config).await
}

/// Opens the S3-backed queue described by an already resolved config.
///
/// # Errors
///
/// Same as [`connect`], minus config loading.
pub async fn open(config: &StashqConfig) -> Result<Queue, ConnectError> {
    if config.bucket.is_empty() {
        return Err(ConnectError::MissingBucket);
    }
    let queue_config = config
        .queue
        .to_queue_config()
        .map_err(ConnectError::InvalidConfig)?;

    let s3_config = S3Config::new(
        config.endpoint.clone(),
        config.bucket.clone(),
        config.region.clone(),
    )
    .with_conditional_writes(config.queue.conditional_writes.unwrap_or(false));
    let client = S3Client::new(s3_config).await?;

    queue_config
        .validate(client.capabilities())
        .map_err(ConnectError::InvalidConfig)?;

    tracing::info!(
        bucket = %client.bucket(),
        prefix = %queue_config.prefix,
        strategy = ?queue_config.claim_strategy,
        "Connected to queue"
    );
    Ok(Queue::with_config(Arc::new(client), queue_config))
}
