/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `history` manages the stored conversation snapshot
- [`show_limits`] prints the effective limits and storage settings

Handlers print to stdout and return errors for `main` to report.
*/

use crate::config::Config;
use crate::error::Result;
use crate::history::format_bytes;
use colored::Colorize;
use prettytable::{format, Table};

pub mod history;

pub use history::handle_history;

/// Print the effective history limits and storage settings
pub fn show_limits(config: &Config) -> Result<()> {
    let limits = &config.history;
    let storage = &config.storage;

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row!["Setting".bold(), "Value".bold()]);
    table.add_row(prettytable::row!["Max conversations", limits.max_conversations]);
    table.add_row(prettytable::row![
        "Max messages per conversation",
        limits.max_messages_per_conversation
    ]);
    table.add_row(prettytable::row![
        "Max storage",
        format_bytes(limits.max_storage_bytes)
    ]);
    table.add_row(prettytable::row![
        "Cleanup threshold",
        format!("{:.0}%", limits.cleanup_threshold * 100.0)
    ]);
    table.add_row(prettytable::row!["Max age", format!("{} days", limits.max_age_days)]);
    table.add_row(prettytable::row![
        "Truncate oversized",
        if limits.truncate_oversized { "yes" } else { "no" }
    ]);
    table.add_row(prettytable::row!["Backend", storage.backend.to_string().cyan()]);

    let location = match storage.backend {
        crate::storage::BackendKind::Memory => "-".to_string(),
        _ => storage
            .resolved_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "unknown".to_string()),
    };
    table.add_row(prettytable::row!["Location", location]);
    table.add_row(prettytable::row!["Storage quota", format_bytes(storage.quota_bytes)]);
    table.add_row(prettytable::row![
        "Request max age",
        format!("{}s", config.requests.max_age_seconds)
    ]);

    println!("\nHistory Limits:");
    table.printstd();
    println!();
    Ok(())
}
