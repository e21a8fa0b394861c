//! stashq - S3-only task queue

use std::io;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use stashq::cli::{Cli, Commands, ConfigCommands, ConnectionArgs, QueueCommands};
use stashq::config::{format_config, load_config, validate_config, ConfigSources, StashqConfig};
use stashq::models::{NewTask, Outcome, TaskRecord};
use stashq::queue::{
    open, ConnectError, ConnectOptions, ListOptions, Queue, QueueError, TraceSummary,
};
use stashq::storage::{MemoryStore, StorageError};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Displays an error with rich context and suggestions if available.
fn display_error(err: &anyhow::Error) {
    if let Some(queue_err) = err.downcast_ref::<QueueError>() {
        eprintln!("{}", queue_err.display_rich());
        return;
    }

    if let Some(storage_err) = err.downcast_ref::<StorageError>() {
        eprintln!("{}", storage_err.display_rich());
        return;
    }

    for cause in err.chain() {
        if let Some(storage_err) = cause.downcast_ref::<StorageError>() {
            eprintln!("Error: {err}\n");
            eprintln!("Caused by: {}", storage_err.display_rich());
            return;
        }
    }

    eprintln!("Error: {err}");
}

/// Connection flags as connect options; profile and config file are resolved separately.
fn connect_options(flags: &ConnectionArgs) -> ConnectOptions {
    ConnectOptions {
        endpoint: flags.endpoint.clone(),
        bucket: flags.bucket.clone(),
        region: flags.region.clone(),
        prefix: flags.prefix.clone(),
        claim_strategy: flags.claim_strategy.clone(),
        timeout_ms: flags.timeout_ms,
        ..Default::default()
    }
}

/// Loads layered config and applies the command-line overrides on top.
fn resolve_config(
    profile: Option<&str>,
    custom: Option<&std::path::PathBuf>,
    flags: &ConnectionArgs,
) -> Result<StashqConfig> {
    let mut config = load_config(profile, custom)?;
    connect_options(flags).apply(&mut config);
    Ok(config)
}

async fn open_queue(config: &StashqConfig, memory: bool) -> Result<Queue> {
    if memory {
        tracing::warn!("Using an in-memory store; nothing will be persisted");
        let queue_config = config
            .queue
            .to_queue_config()
            .map_err(ConnectError::InvalidConfig)?;
        return Ok(Queue::with_config(
            Arc::new(MemoryStore::with_conditional_writes()),
            queue_config,
        ));
    }
    Ok(open(config).await?)
}

fn print_record(record: &TaskRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
    } else {
        println!("Task: {}", record.task_id);
        println!("  Status: {}", record.status.display_name());
        println!("  Function: {}", record.function_name);
        println!("  Team: {}", record.team_name);
        println!("  Priority: {}", record.priority);
        println!("  Retry Count: {}", record.retry_count);
        if let Some(ref machine) = record.machine_name {
            println!("  Machine: {machine}");
        }
        if let Some(ref bridge) = record.bridge_name {
            println!("  Bridge: {bridge}");
        }
        println!("  Created: {}", record.created_at);
        println!("  Updated: {}", record.updated_at);
        if let Some(started) = record.started_at {
            println!("  Started: {started}");
        }
        if let Some(completed) = record.completed_at {
            println!("  Completed: {completed}");
        }
        if let Some(code) = record.exit_code {
            println!("  Exit Code: {code}");
        }
        if let Some(ref message) = record.error_message {
            println!("  Error: {message}");
        }
        if let Some(ref output) = record.console_output {
            println!("  Output:\n{output}");
        }
    }
    Ok(())
}

fn print_summary(summary: &TraceSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!("Task: {}", summary.task_id);
    println!("  Status: {}", summary.status.display_name());
    if let Some(progress) = summary.progress {
        println!("  Progress: {progress}");
    }
    println!("  Function: {}", summary.function_name);
    println!("  Team: {}", summary.team_name);
    println!("  Age: {} min", summary.age_minutes);
    println!("  Retry Count: {}", summary.retry_count);
    println!("  Has Response: {}", summary.has_response);
    if let Some(ref reason) = summary.last_failure_reason {
        println!("  Last Failure: {reason}");
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        display_error(&e);
        std::process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        // Completions and config commands need no credentials
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "stashq", &mut io::stdout());
            return Ok(());
        }
        Commands::Config { command } => {
            let config =
                resolve_config(cli.profile.as_deref(), cli.config.as_ref(), &cli.connection)?;
            match command {
                ConfigCommands::Show => {
                    let sources =
                        ConfigSources::discover().with_custom_config(cli.config.clone());
                    print!("{}", format_config(&config, &sources));
                }
                ConfigCommands::Validate => {
                    let errors = validate_config(&config);
                    if errors.is_empty() {
                        println!("Configuration is valid.");
                    } else {
                        eprintln!("Configuration errors:");
                        for error in &errors {
                            eprintln!("  - {error}");
                        }
                        std::process::exit(1);
                    }
                }
            }
            return Ok(());
        }
        Commands::Queue(command) => command,
    };

    let config = resolve_config(cli.profile.as_deref(), cli.config.as_ref(), &cli.connection)?;

    // Ctrl-C aborts the in-flight store calls
    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });
    let queue = open_queue(&config, cli.connection.memory)
        .await?
        .with_cancellation(token);
    tracing::debug!(guarantee = ?queue.guarantee(), "Queue ready");

    match command {
        QueueCommands::Create {
            function,
            team,
            vault,
            priority,
            machine,
            bridge,
            params,
            json,
        } => {
            let mut input = NewTask::new(function, team, vault);
            if let Some(priority) = priority {
                input = input.priority(priority);
            }
            if let Some(machine) = machine {
                input = input.machine_name(machine);
            }
            if let Some(bridge) = bridge {
                input = input.bridge_name(bridge);
            }
            if let Some(raw) = params {
                let value: serde_json::Value = serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid --params JSON: {raw}"))?;
                if !value.is_object() {
                    return Err(anyhow!("--params must be a JSON object"));
                }
                input = input.params(value);
            }

            let task_id = queue.create(input).await?;
            if json {
                println!("{}", serde_json::json!({ "taskId": task_id }));
            } else {
                println!("Task created: {task_id}");
            }
        }

        QueueCommands::Claim { task_id, json } => {
            let record = queue.claim(task_id).await?;
            print_record(&record, json)?;
        }

        QueueCommands::Complete {
            task_id,
            exit_code,
            error,
            output,
            json,
        } => {
            let outcome = Outcome {
                exit_code,
                error_message: error,
                console_output: output,
            };
            let record = queue.complete(task_id, outcome).await?;
            print_record(&record, json)?;
        }

        QueueCommands::Cancel { task_id, json } => {
            let record = queue.cancel(task_id).await?;
            print_record(&record, json)?;
        }

        QueueCommands::Retry { task_id, json } => {
            let record = queue.retry(task_id).await?;
            print_record(&record, json)?;
        }

        QueueCommands::Delete { task_id } => {
            queue.delete(task_id).await?;
            println!("Task {task_id} deleted");
        }

        QueueCommands::Trace {
            task_id,
            full,
            json,
        } => {
            if full {
                match queue.trace(task_id).await? {
                    Some(record) => print_record(&record, json)?,
                    None => not_found(task_id, json),
                }
            } else {
                match queue.trace_summary(task_id).await? {
                    Some(summary) => print_summary(&summary, json)?,
                    None => not_found(task_id, json),
                }
            }
        }

        QueueCommands::List {
            status,
            limit,
            show_skipped,
            json,
        } => {
            let mut options = ListOptions::default().limit(limit);
            if !status.is_empty() {
                options = options.statuses(status);
            }
            let report = queue.list_report(options).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for task in &report.tasks {
                    println!(
                        "{} | {} | {} | {} | {}",
                        task.task_id, task.function_name, task.team_name, task.status, task.updated_at
                    );
                }
                println!("Total: {} tasks", report.tasks.len());
                if !report.skipped.is_empty() {
                    println!("Skipped: {} unreadable keys", report.skipped.len());
                    if show_skipped {
                        for skipped in &report.skipped {
                            println!("  {} ({})", skipped.key, skipped.reason);
                        }
                    }
                }
            }
        }

        QueueCommands::Duplicates { json } => {
            let duplicates = queue.find_duplicates().await?;
            if json {
                let entries: Vec<_> = duplicates
                    .iter()
                    .map(|(task_id, statuses)| {
                        serde_json::json!({ "taskId": task_id, "statuses": statuses })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if duplicates.is_empty() {
                println!("No duplicated tasks");
            } else {
                for (task_id, statuses) in &duplicates {
                    let names: Vec<_> = statuses.iter().map(|s| s.namespace()).collect();
                    println!("{task_id}: {}", names.join(", "));
                }
                println!("Total: {} duplicated tasks", duplicates.len());
            }
        }
    }

    Ok(())
}

fn not_found(task_id: uuid::Uuid, json: bool) {
    if json {
        println!("null");
    } else {
        println!("Task {task_id} not found");
    }
}
