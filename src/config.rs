//! Configuration file support for stashq.
//!
//! Load settings from `.stashq.toml` or `~/.config/stashq/config.toml`.
//!
//! ## Config Resolution Order
//!
//! 1. CLI flags (highest priority)
//! 2. Environment variables (`S3_BUCKET`, `S3_ENDPOINT`, `S3_REGION`, `STASHQ_*`)
//! 3. Profile-specific settings (if `--profile` specified)
//! 4. Custom config file (if `--config` specified)
//! 5. Project-level `.stashq.toml`
//! 6. User-level `~/.config/stashq/config.toml`
//! 7. Built-in defaults (lowest priority)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::queue::{ClaimStrategy, QueueConfig};

/// Resolved configuration for stashq.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StashqConfig {
    /// S3 bucket holding the queue.
    pub bucket: String,
    /// Optional custom S3 endpoint (e.g., for local development with MinIO).
    pub endpoint: Option<String>,
    /// AWS region (defaults to "us-east-1").
    #[serde(default = "default_region")]
    pub region: String,
    /// Queue-level configuration.
    #[serde(default)]
    pub queue: QueueSection,
}

/// Queue-level configuration section.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct QueueSection {
    /// Key prefix the status namespaces live under. Default: bucket root.
    pub prefix: Option<String>,
    /// `best_effort`, `conditional` or `auto`. Default: `auto`.
    pub claim_strategy: Option<String>,
    /// Whether the S3 service honors `If-None-Match: *`. Default: false.
    pub conditional_writes: Option<bool>,
    /// Per-operation deadline in milliseconds. Default: none.
    pub timeout_ms: Option<u64>,
}

impl QueueSection {
    /// Convert to the queue's `QueueConfig` type.
    ///
    /// # Errors
    ///
    /// Returns an error if `claim_strategy` is not a known strategy.
    pub fn to_queue_config(&self) -> Result<QueueConfig, String> {
        let claim_strategy = match self.claim_strategy.as_deref() {
            Some(s) => s.parse::<ClaimStrategy>()?,
            None => ClaimStrategy::default(),
        };
        Ok(QueueConfig {
            prefix: self.prefix.clone().unwrap_or_default(),
            claim_strategy,
            operation_timeout_ms: self.timeout_ms,
        })
    }
}

/// Configuration file structure supporting profiles.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ConfigFile {
    /// Default settings (used when no profile is specified).
    #[serde(default)]
    pub default: DefaultSection,
    /// Named profiles that override default settings.
    #[serde(default)]
    pub profiles: HashMap<String, ProfileSection>,
    /// Queue configuration section.
    #[serde(default)]
    pub queue: QueueSection,
}

/// Default section in config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DefaultSection {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

/// Profile-specific settings that can override defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ProfileSection {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    /// Lets profiles point at different queues in one bucket.
    pub prefix: Option<String>,
}

/// Information about which config files were loaded.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// User-level config path (~/.config/stashq/config.toml)
    pub user_config: Option<PathBuf>,
    pub user_config_exists: bool,
    /// Project-level config path (.stashq.toml)
    pub project_config: Option<PathBuf>,
    pub project_config_exists: bool,
    /// Custom config path (from --config flag)
    pub custom_config: Option<PathBuf>,
    pub custom_config_exists: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for StashqConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            endpoint: None,
            region: default_region(),
            queue: QueueSection::default(),
        }
    }
}

impl ConfigFile {
    /// Get resolved configuration for a given profile.
    /// Profile settings override [default] section.
    #[must_use]
    pub fn resolve(&self, profile: Option<&str>) -> StashqConfig {
        let mut config = StashqConfig {
            bucket: self.default.bucket.clone().unwrap_or_default(),
            endpoint: self.default.endpoint.clone(),
            region: self.default.region.clone().unwrap_or_else(default_region),
            queue: self.queue.clone(),
        };

        if let Some(profile_section) = profile.and_then(|name| self.profiles.get(name)) {
            if let Some(ref bucket) = profile_section.bucket {
                config.bucket.clone_from(bucket);
            }
            if let Some(ref region) = profile_section.region {
                config.region.clone_from(region);
            }
            if profile_section.endpoint.is_some() {
                config.endpoint.clone_from(&profile_section.endpoint);
            }
            if profile_section.prefix.is_some() {
                config.queue.prefix.clone_from(&profile_section.prefix);
            }
        }

        config
    }
}

impl ConfigSources {
    /// Discover config file locations.
    #[must_use]
    pub fn discover() -> Self {
        let user_config = get_user_config_path();
        let user_config_exists = user_config.as_ref().is_some_and(|p| p.exists());

        let project_config = get_project_config_path();
        let project_config_exists = project_config.exists();

        Self {
            user_config,
            user_config_exists,
            project_config: Some(project_config),
            project_config_exists,
            custom_config: None,
            custom_config_exists: false,
        }
    }

    /// Add a custom config path.
    #[must_use]
    pub fn with_custom_config(mut self, path: Option<PathBuf>) -> Self {
        if let Some(p) = path {
            self.custom_config_exists = p.exists();
            self.custom_config = Some(p);
        }
        self
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    /// Failed to read configuration file.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Get the user-level config path (~/.config/stashq/config.toml).
#[must_use]
pub fn get_user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("stashq").join("config.toml"))
}

/// Get the project-level config path (.stashq.toml in current directory).
#[must_use]
pub fn get_project_config_path() -> PathBuf {
    PathBuf::from(".stashq.toml")
}

/// Load configuration from a TOML string.
///
/// # Errors
/// Returns `ConfigError::TomlParse` if the TOML is invalid.
pub fn load_from_str(toml_content: &str) -> Result<ConfigFile, ConfigError> {
    let config: ConfigFile = toml::from_str(toml_content)?;
    Ok(config)
}

/// Load configuration from a file path.
///
/// # Errors
/// Returns `ConfigError::Io` if the file cannot be read, or
/// `ConfigError::TomlParse` if the TOML is invalid.
pub fn load_from_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

/// Load configuration with the specified profile and optional custom config path.
///
/// CLI flags are applied by the caller after this returns.
///
/// # Errors
/// Returns an error if a config file exists but cannot be parsed, or if the
/// custom config file cannot be read.
pub fn load_config(
    profile: Option<&str>,
    custom_config: Option<&PathBuf>,
) -> Result<StashqConfig, ConfigError> {
    let mut merged = ConfigFile::default();

    if let Some(user_path) = get_user_config_path() {
        if user_path.exists() {
            merge_config_file(&mut merged, &load_from_file(&user_path)?);
        }
    }

    let project_path = get_project_config_path();
    if project_path.exists() {
        merge_config_file(&mut merged, &load_from_file(&project_path)?);
    }

    if let Some(custom_path) = custom_config {
        merge_config_file(&mut merged, &load_from_file(custom_path)?);
    }

    let mut config = merged.resolve(profile);
    apply_env_overrides(&mut config, |name| env::var(name).ok());

    tracing::debug!(
        bucket = %config.bucket,
        profile = profile.unwrap_or("default"),
        "Configuration loaded"
    );
    Ok(config)
}

/// Merge a config file into the base config (later values override earlier).
pub fn merge_config_file(base: &mut ConfigFile, overlay: &ConfigFile) {
    if overlay.default.bucket.is_some() {
        base.default.bucket.clone_from(&overlay.default.bucket);
    }
    if overlay.default.region.is_some() {
        base.default.region.clone_from(&overlay.default.region);
    }
    if overlay.default.endpoint.is_some() {
        base.default.endpoint.clone_from(&overlay.default.endpoint);
    }

    for (name, profile) in &overlay.profiles {
        base.profiles.insert(name.clone(), profile.clone());
    }

    if overlay.queue.prefix.is_some() {
        base.queue.prefix.clone_from(&overlay.queue.prefix);
    }
    if overlay.queue.claim_strategy.is_some() {
        base.queue
            .claim_strategy
            .clone_from(&overlay.queue.claim_strategy);
    }
    if overlay.queue.conditional_writes.is_some() {
        base.queue.conditional_writes = overlay.queue.conditional_writes;
    }
    if overlay.queue.timeout_ms.is_some() {
        base.queue.timeout_ms = overlay.queue.timeout_ms;
    }
}

/// Apply environment variable overrides, reading variables through `var`.
pub fn apply_env_overrides<F>(config: &mut StashqConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(bucket) = var("S3_BUCKET") {
        config.bucket = bucket;
    }
    if let Some(endpoint) = var("S3_ENDPOINT") {
        config.endpoint = Some(endpoint).filter(|s| !s.is_empty());
    }
    if let Some(region) = var("S3_REGION") {
        config.region = region;
    }

    if let Some(prefix) = var("STASHQ_PREFIX") {
        config.queue.prefix = Some(prefix);
    }
    if let Some(strategy) = var("STASHQ_CLAIM_STRATEGY") {
        config.queue.claim_strategy = Some(strategy);
    }
    if let Some(val) = var("STASHQ_CONDITIONAL_WRITES") {
        config.queue.conditional_writes = Some(val == "1" || val.eq_ignore_ascii_case("true"));
    }
    if let Some(val) = var("STASHQ_TIMEOUT_MS") {
        if let Ok(ms) = val.parse() {
            config.queue.timeout_ms = Some(ms);
        }
    }
}

/// Validate the configuration.
///
/// Returns a list of validation errors (empty if valid).
#[must_use]
pub fn validate_config(config: &StashqConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.bucket.is_empty() {
        errors.push("bucket: not configured (set S3_BUCKET or add to config file)".to_string());
    }

    if config.region.is_empty() {
        errors.push("region: not configured (set S3_REGION or add to config file)".to_string());
    }

    if let Some(ref endpoint) = config.endpoint {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            errors.push(format!(
                "endpoint: '{endpoint}' must start with http:// or https://"
            ));
        }
    }

    match config.queue.to_queue_config() {
        Ok(queue_config) => {
            let caps = crate::storage::StoreCapabilities {
                conditional_writes: config.queue.conditional_writes.unwrap_or(false),
            };
            if let Err(e) = queue_config.validate(caps) {
                errors.push(format!("queue: {e}"));
            }
        }
        Err(e) => errors.push(format!("queue.claim_strategy: {e}")),
    }

    errors
}

/// Format the configuration for display.
#[must_use]
pub fn format_config(config: &StashqConfig, sources: &ConfigSources) -> String {
    let mut output = String::new();

    output.push_str("# Resolved Configuration\n\n");

    output.push_str("[s3]\n");
    let _ = writeln!(
        output,
        "bucket = {}",
        if config.bucket.is_empty() {
            "(not set)".to_string()
        } else {
            format!("\"{}\"", config.bucket)
        }
    );
    let _ = writeln!(
        output,
        "endpoint = {}",
        config
            .endpoint
            .as_deref()
            .map_or("(not set)".to_string(), |s| format!("\"{s}\""))
    );
    let _ = writeln!(output, "region = \"{}\"", config.region);

    output.push_str("\n[queue]\n");
    let _ = writeln!(
        output,
        "prefix = {}",
        config
            .queue
            .prefix
            .as_deref()
            .map_or("(default: bucket root)".to_string(), |s| format!("\"{s}\""))
    );
    let _ = writeln!(
        output,
        "claim_strategy = {}",
        config
            .queue
            .claim_strategy
            .as_deref()
            .map_or("(default: auto)".to_string(), |s| format!("\"{s}\""))
    );
    let _ = writeln!(
        output,
        "conditional_writes = {}",
        config
            .queue
            .conditional_writes
            .map_or("(default: false)".to_string(), |v| v.to_string())
    );
    let _ = writeln!(
        output,
        "timeout_ms = {}",
        config
            .queue
            .timeout_ms
            .map_or("(not set)".to_string(), |v| v.to_string())
    );

    output.push_str("\n# Sources (in priority order, highest first)\n");
    output.push_str("# 1. CLI flags\n");
    output.push_str("# 2. Environment variables\n");

    let mut rank = 3;
    let files = [
        ("Custom config", &sources.custom_config, sources.custom_config_exists),
        ("Project config", &sources.project_config, sources.project_config_exists),
        ("User config", &sources.user_config, sources.user_config_exists),
    ];
    for (label, path, exists) in files {
        if let Some(path) = path {
            let _ = writeln!(
                output,
                "# {rank}. {label}: {} {}",
                path.display(),
                if exists { "(loaded)" } else { "(not found)" }
            );
            rank += 1;
        }
    }

    output
}
