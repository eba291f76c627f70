use anyhow::{Context, Result};
use uuid::Uuid;

use knowbase_lib::chat_sessions::ROLE_USER;

use super::truncate;
use crate::app::App;
use crate::OutputFormat;

pub fn run_list(app: &App, format: &OutputFormat) -> Result<()> {
    let sessions = app.sessions()?.list_sessions().context("Failed to list conversations")?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        OutputFormat::Plain => {
            if sessions.is_empty() {
                println!("No conversations yet.");
                return Ok(());
            }
            for s in &sessions {
                println!(
                    "{}  {}  {:<26} ({} messages)",
                    s.id,
                    s.updated_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
                    truncate(&s.title, 26),
                    s.message_count
                );
            }
        }
    }

    Ok(())
}

pub fn run_show(app: &App, id: Uuid, show_sources: bool, format: &OutputFormat) -> Result<()> {
    let session = app
        .sessions()?
        .get_session(id)
        .with_context(|| format!("Failed to load conversation {}", id))?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        OutputFormat::Plain => {
            println!("# {}\n", session.title);
            for message in &session.messages {
                let speaker = if message.role == ROLE_USER { "you" } else { "assistant" };
                println!("[{}]\n{}\n", speaker, message.content);
                if show_sources {
                    if let Some(sources) = &message.sources {
                        println!("--- sources ---\n{}\n", sources);
                    }
                }
            }
        }
    }

    Ok(())
}

pub fn run_delete(app: &App, id: Uuid, format: &OutputFormat) -> Result<()> {
    app.sessions()?
        .delete_session(id)
        .with_context(|| format!("Failed to delete conversation {}", id))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "id": id, "deleted": true })),
        OutputFormat::Plain => println!("Deleted conversation {}", id),
    }
    Ok(())
}
