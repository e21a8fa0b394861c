//! CLI module for the stashq task queue.

mod commands;

pub use commands::{Cli, Commands, ConfigCommands, ConnectionArgs, QueueCommands};
