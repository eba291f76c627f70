mod app;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "knowbase-cli", about = "Knowledge-base assistant CLI", version)]
struct Cli {
    /// Config file (default: <config dir>/knowbase/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Add documents (.pdf, .docx, .txt) to the knowledge base
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List ingested documents
    Files,

    /// Remove every chunk of a document
    Delete {
        /// Document name as shown by `files`
        name: String,
    },

    /// Drop the whole knowledge base
    Reset {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Retrieve context for a query without asking the model
    Search {
        /// Search query
        query: String,
        /// Candidates recalled from the vector store (10-100)
        #[arg(long)]
        recall: Option<usize>,
        /// Candidates kept after reranking (1-10)
        #[arg(long)]
        rerank: Option<usize>,
    },

    /// Ask a question against the knowledge base
    Ask {
        /// Question (use "-" to read from stdin)
        query: String,
        /// Also search the web
        #[arg(long)]
        web: bool,
        /// Continue an existing conversation
        #[arg(long)]
        chat: Option<Uuid>,
        /// Sampling temperature (0.0-1.3)
        #[arg(long)]
        temperature: Option<f32>,
    },

    /// Conversation history
    #[command(subcommand)]
    History(HistoryCommand),
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// List conversations, newest first
    List,

    /// Print a conversation
    Show {
        id: Uuid,
        /// Include the retrieved context of each answer
        #[arg(long)]
        sources: bool,
    },

    /// Delete a conversation
    Delete { id: Uuid },
}

/// Resolve "-" as stdin
fn resolve_query(query: String) -> anyhow::Result<String> {
    if query == "-" {
        let mut buf = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)?;
        Ok(buf.trim().to_string())
    } else {
        Ok(query)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let app = app::App::new(cli.config.as_deref())?;

    match cli.command {
        Command::Ingest { files } => {
            commands::ingest::run(&app, &files, &cli.format)?;
        }
        Command::Files => {
            commands::files::run_list(&app, &cli.format)?;
        }
        Command::Delete { name } => {
            commands::files::run_delete(&app, &name, &cli.format)?;
        }
        Command::Reset { yes } => {
            commands::files::run_reset(&app, yes, &cli.format)?;
        }
        Command::Search { query, recall, rerank } => {
            commands::search::run(&app, &query, recall, rerank, &cli.format)?;
        }
        Command::Ask { query, web, chat, temperature } => {
            let query = resolve_query(query)?;
            commands::ask::run(&app, &query, web, chat, temperature, &cli.format)?;
        }
        Command::History(subcmd) => match subcmd {
            HistoryCommand::List => commands::history::run_list(&app, &cli.format)?,
            HistoryCommand::Show { id, sources } => {
                commands::history::run_show(&app, id, sources, &cli.format)?
            }
            HistoryCommand::Delete { id } => commands::history::run_delete(&app, id, &cli.format)?,
        },
    }

    Ok(())
}
