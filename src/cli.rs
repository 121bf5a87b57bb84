//! Command-line interface definition for Chatkeep
//!
//! This module defines the CLI structure using clap's derive API, providing
//! commands to inspect and maintain the local conversation history.

use crate::storage::BackendKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Chatkeep - bounded local conversation history
///
/// Inspect, export and maintain the conversation snapshot kept by a chat
/// client, within its storage budget.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatkeep")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/chatkeep.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the storage location
    #[arg(long, env = "CHATKEEP_STORAGE_PATH")]
    pub storage_path: Option<PathBuf>,

    /// Override the storage backend (sled, sqlite, memory)
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Manage stored conversation history
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Show the effective history limits
    Limits,
}

/// History management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List stored conversations, most recent first
    List,

    /// Show storage usage against the budget
    Info,

    /// Print every message of one conversation
    Show {
        /// Conversation ID
        id: String,
    },

    /// Delete a conversation
    Delete {
        /// Conversation ID to delete
        id: String,
    },

    /// Discard the least recently active 20% of conversations
    Cleanup,

    /// Export history as pretty-printed JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace history with a previously exported file
    Import {
        /// File produced by `history export`
        path: PathBuf,
    },

    /// Remove all stored history
    Clear,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/chatkeep.yaml".to_string()),
            verbose: false,
            json_logs: false,
            storage_path: None,
            backend: None,
            command: Commands::Limits,
        }
    }
}
