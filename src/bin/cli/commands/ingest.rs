use std::path::PathBuf;

use anyhow::{Context, Result};

use knowbase_lib::rag::{ingest_files, SourceFile};

use crate::app::App;
use crate::OutputFormat;

pub fn run(app: &App, paths: &[PathBuf], format: &OutputFormat) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("Not a file: {}", path.display()))?;
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(SourceFile { filename, bytes });
    }

    let embedder = app.embedder()?;
    let report = ingest_files(&embedder, &app.store, &files, &app.settings.chunking);

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "inserted": report.inserted,
                "succeeded": report.succeeded.iter().map(|(name, chunks)| serde_json::json!({
                    "file": name,
                    "chunks": chunks,
                })).collect::<Vec<_>>(),
                "failed": report.failed.iter().map(|(name, err)| serde_json::json!({
                    "file": name,
                    "error": err.to_string(),
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            for (name, chunks) in &report.succeeded {
                println!("  ok    {} ({} chunks)", name, chunks);
            }
            for (name, err) in &report.failed {
                println!("  fail  {}: {}", name, err);
            }
            println!(
                "\nStored {} chunks from {} of {} files",
                report.inserted,
                report.succeeded.len(),
                files.len()
            );
        }
    }

    Ok(())
}
