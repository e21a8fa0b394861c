//! CLI commands for the stashq task queue.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use uuid::Uuid;

use crate::models::TaskStatus;

/// stashq - S3-only task queue CLI
#[derive(Parser, Debug)]
#[command(name = "stashq", version, about = "S3-only task queue state machine")]
pub struct Cli {
    /// Configuration profile to use
    #[arg(long, global = true, env = "STASHQ_PROFILE")]
    pub profile: Option<String>,

    /// Path to config file (overrides default locations)
    #[arg(long, global = true, env = "STASHQ_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags that override the resolved connection settings.
#[derive(Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// S3 bucket
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// S3 endpoint URL (MinIO, LocalStack, R2, ...)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// AWS region
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Key prefix of the queue inside the bucket
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Claim strategy: best-effort, conditional, or auto
    #[arg(long, global = true)]
    pub claim_strategy: Option<String>,

    /// Per-operation timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Run against a throwaway in-memory store instead of S3
    #[arg(long, global = true)]
    pub memory: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Commands that talk to the queue
    #[command(flatten)]
    Queue(QueueCommands),

    /// Manage configuration
    Config {
        /// The config subcommand to run
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Task operations against the configured bucket
#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// Submit a new task to the queue
    Create {
        /// Function the worker should run
        #[arg(long, short = 'f')]
        function: String,

        /// Owning team
        #[arg(long, short = 't')]
        team: String,

        /// Opaque payload passed through to the worker
        #[arg(long, default_value = "")]
        vault: String,

        /// Priority (default: 3)
        #[arg(long, short = 'p')]
        priority: Option<i32>,

        /// Target machine
        #[arg(long)]
        machine: Option<String>,

        /// Bridge that routes the task
        #[arg(long)]
        bridge: Option<String>,

        /// Function parameters as a JSON object
        #[arg(long)]
        params: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Claim a pending task
    Claim {
        /// Task ID (UUID)
        task_id: Uuid,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report the outcome of an active task
    Complete {
        /// Task ID (UUID)
        task_id: Uuid,

        /// Exit code (0 = completed, anything else = failed)
        #[arg(long, short = 'c', default_value = "0", allow_hyphen_values = true)]
        exit_code: i32,

        /// Error message for failed tasks
        #[arg(long, short = 'e')]
        error: Option<String>,

        /// Captured console output
        #[arg(long)]
        output: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cancel a pending or active task
    Cancel {
        /// Task ID (UUID)
        task_id: Uuid,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a failed task back to pending
    Retry {
        /// Task ID (UUID)
        task_id: Uuid,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a task from whichever status holds it
    Delete {
        /// Task ID (UUID)
        task_id: Uuid,
    },

    /// Show a task's current record
    Trace {
        /// Task ID (UUID)
        task_id: Uuid,

        /// Print the full stored record instead of the summary
        #[arg(long)]
        full: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List tasks
    List {
        /// Filter by status (repeatable)
        #[arg(long, short = 's')]
        status: Vec<TaskStatus>,

        /// Max tasks to return
        #[arg(long, default_value = "50")]
        limit: usize,

        /// Also print keys that could not be read
        #[arg(long)]
        show_skipped: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find tasks stranded in more than one status
    Duplicates {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved configuration
    Show,
    /// Validate configuration
    Validate,
}
