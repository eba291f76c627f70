use std::io::Write;

use anyhow::{bail, Context, Result};

use crate::app::App;
use crate::OutputFormat;

pub fn run_list(app: &App, format: &OutputFormat) -> Result<()> {
    let sources = app.store.list_sources().context("Failed to list documents")?;
    let chunks = app.store.count().context("Failed to count chunks")?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "files": sources,
                "chunks": chunks,
                "path": app.store.db_path().to_string_lossy(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if sources.is_empty() {
                println!("Knowledge base is empty.");
                return Ok(());
            }
            for source in &sources {
                println!("  {}", source);
            }
            println!("\n{} files, {} chunks", sources.len(), chunks);
        }
    }

    Ok(())
}

pub fn run_delete(app: &App, name: &str, format: &OutputFormat) -> Result<()> {
    let deleted = app.store.delete_by_source(name);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "file": name, "deleted": deleted }));
        }
        OutputFormat::Plain => {
            if deleted {
                println!("Deleted {}", name);
            } else {
                println!("Failed to delete {} (see log)", name);
            }
        }
    }

    if !deleted {
        bail!("Failed to delete {}", name);
    }
    Ok(())
}

pub fn run_reset(app: &App, yes: bool, format: &OutputFormat) -> Result<()> {
    if !yes && !confirm("Drop every document from the knowledge base?")? {
        println!("Aborted.");
        return Ok(());
    }

    app.store.reset();

    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "reset": true })),
        OutputFormat::Plain => println!("Knowledge base cleared."),
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowbase_lib::config::Settings;
    use knowbase_lib::rag::VectorStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn app(dir: &TempDir) -> App {
        App {
            settings: Settings::default(),
            data_dir: dir.path().to_path_buf(),
            store: Arc::new(VectorStore::open_in(dir.path()).unwrap()),
        }
    }

    #[test]
    fn test_delete_of_unknown_file_succeeds() {
        let dir = TempDir::new().unwrap();
        assert!(run_delete(&app(&dir), "missing.txt", &OutputFormat::Json).is_ok());
    }

    #[test]
    fn test_failed_delete_is_an_error() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);
        let conn = rusqlite::Connection::open(app.store.db_path()).unwrap();
        conn.execute_batch("DROP TABLE records").unwrap();
        drop(conn);

        let err = run_delete(&app, "notes.txt", &OutputFormat::Plain).unwrap_err();
        assert_eq!(err.to_string(), "Failed to delete notes.txt");
    }
}
