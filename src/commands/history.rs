use crate::cli::HistoryCommand;
use crate::error::{ChatkeepError, Result};
use crate::history::{parse_import, HistoryManager, Role};
use colored::Colorize;
use prettytable::{format, Table};
use std::path::Path;

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Handle history commands against `history`
pub fn handle_history(command: HistoryCommand, history: &HistoryManager) -> Result<()> {
    match command {
        HistoryCommand::List => list(history),
        HistoryCommand::Info => info(history),
        HistoryCommand::Show { id } => show(history, &id),
        HistoryCommand::Delete { id } => {
            if history.get_conversation(&id).is_none() {
                return Err(ChatkeepError::NotFound(id).into());
            }
            if !history.delete_conversation(&id) {
                return Err(
                    ChatkeepError::Storage(format!("Failed to delete conversation {}", id)).into(),
                );
            }
            println!("{}", format!("Deleted conversation {}", id).green());
            Ok(())
        }
        HistoryCommand::Cleanup => {
            let before = history.get_storage_info().conversation_count;
            if !history.perform_cleanup() {
                return Err(ChatkeepError::Storage("Cleanup could not be saved".to_string()).into());
            }
            let after = history.get_storage_info().conversation_count;
            println!(
                "{}",
                format!("Removed {} of {} conversations", before - after, before).green()
            );
            Ok(())
        }
        HistoryCommand::Export { output } => {
            let exported = history.export();
            match output {
                Some(path) => {
                    std::fs::write(&path, exported)?;
                    eprintln!("{}", format!("Exported history to {}", path.display()).green());
                }
                None => println!("{}", exported),
            }
            Ok(())
        }
        HistoryCommand::Import { path } => import(history, &path),
        HistoryCommand::Clear => {
            if !history.clear() {
                return Err(ChatkeepError::Storage("Failed to clear history".to_string()).into());
            }
            println!("{}", "Cleared conversation history".green());
            Ok(())
        }
    }
}

fn list(history: &HistoryManager) -> Result<()> {
    let summaries = history.list_summaries();

    if summaries.is_empty() {
        println!("{}", "No conversation history found.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Last Activity".bold()
    ]);

    for summary in summaries {
        let updated = summary.last_activity.format("%Y-%m-%d %H:%M").to_string();
        table.add_row(prettytable::row![
            summary.id.cyan(),
            shorten(&summary.title, 40),
            summary.message_count,
            updated
        ]);
    }

    println!("\nConversation History:");
    table.printstd();
    println!();
    println!("Use {} to read a conversation.", "chatkeep history show <ID>".cyan());
    println!();
    Ok(())
}

fn info(history: &HistoryManager) -> Result<()> {
    let snapshot = history.get_storage_info();

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row!["Conversations".bold(), snapshot.conversation_count]);
    table.add_row(prettytable::row![
        "Used".bold(),
        format!("{} / {}", snapshot.used_display, snapshot.max_display)
    ]);
    table.add_row(prettytable::row![
        "Usage".bold(),
        format!("{:.1}%", snapshot.percentage)
    ]);
    table.add_row(prettytable::row!["Backend".bold(), history.store().backend_name()]);

    println!("\nStorage:");
    table.printstd();

    if history.needs_cleanup() {
        println!(
            "{} run {} to free space.",
            "History is close to its storage budget;".yellow(),
            "chatkeep history cleanup".cyan()
        );
    }
    println!();
    Ok(())
}

fn show(history: &HistoryManager, id: &str) -> Result<()> {
    let conversation = history
        .get_conversation(id)
        .ok_or_else(|| ChatkeepError::NotFound(id.to_string()))?;

    println!("\n{}", conversation.title.bold());
    println!("{}\n", conversation.id.dimmed());

    for message in &conversation.messages {
        let role = match message.role {
            Role::User => "user".green(),
            Role::Assistant => "assistant".cyan(),
            Role::System => "system".yellow(),
        };
        let stamp = message.timestamp.format("%Y-%m-%d %H:%M");
        println!("[{}] {}", stamp, role.bold());
        println!("{}", message.content);

        if let Some(sources) = &message.sources {
            for source in sources {
                match source.page {
                    Some(page) => println!("  {} {} (p. {})", "source:".dimmed(), source.document, page),
                    None => println!("  {} {}", "source:".dimmed(), source.document),
                }
            }
        }
        println!();
    }
    Ok(())
}

fn import(history: &HistoryManager, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ChatkeepError::InvalidImport(format!("invalid file {}: {}", path.display(), e))
    })?;

    if history.import(&text) {
        let count = history.get_storage_info().conversation_count;
        println!("{}", format!("Imported history ({} conversations)", count).green());
        return Ok(());
    }

    match parse_import(&text) {
        Err(e) => Err(ChatkeepError::InvalidImport(format!(
            "invalid file {}: {}",
            path.display(),
            e
        ))
        .into()),
        Ok(_) => Err(ChatkeepError::Storage(
            "Imported history does not fit within the storage budget".to_string(),
        )
        .into()),
    }
}
