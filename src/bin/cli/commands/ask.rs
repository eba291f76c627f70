use std::io::Write;

use anyhow::{Context, Result};
use uuid::Uuid;

use knowbase_lib::assistant::AskOptions;
use knowbase_lib::config::validate_temperature;
use knowbase_lib::web_search::WebSearchStatus;

use crate::app::App;
use crate::OutputFormat;

pub fn run(
    app: &App,
    query: &str,
    web: bool,
    chat: Option<Uuid>,
    temperature: Option<f32>,
    format: &OutputFormat,
) -> Result<()> {
    let temperature = temperature.unwrap_or(app.settings.llm.temperature);
    validate_temperature(temperature)?;

    let options = AskOptions {
        params: app.settings.retrieval.params(),
        web_search: web,
        temperature,
    };
    let assistant = app.assistant()?;

    match format {
        OutputFormat::Json => {
            let answer = assistant
                .ask(chat, query, &options, &mut |_| {})
                .context("Failed to answer")?;
            let output = serde_json::json!({
                "chatId": answer.session_id,
                "answer": answer.reply,
                "sources": answer.retrieval.candidates.iter().map(|c| serde_json::json!({
                    "source": c.source,
                    "page": c.page,
                    "score": c.score,
                })).collect::<Vec<_>>(),
                "webDegraded": matches!(
                    answer.web.as_ref().map(|w| &w.status),
                    Some(WebSearchStatus::Degraded { .. })
                ),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            let mut out = DeltaWriter::new(std::io::stdout());
            let answer = assistant
                .ask(chat, query, &options, &mut |delta| out.push(delta))
                .context("Failed to answer")?;
            out.finish().context("Failed to write answer")?;
            println!();

            if let Some(web) = &answer.web {
                if let WebSearchStatus::Degraded { reason } = &web.status {
                    eprintln!("\nweb search unavailable: {}", reason);
                }
            }
            if !answer.retrieval.candidates.is_empty() {
                println!("\nSources:");
                for c in &answer.retrieval.candidates {
                    println!("  {} ({}, score {:.4})", c.source, c.page.label(), c.score);
                }
            }
            println!("\nchat: {}", answer.session_id);
        }
    }

    Ok(())
}

/// Writes streamed text as it arrives. The first write error stops output
/// and is reported by `finish`.
struct DeltaWriter<W: Write> {
    out: W,
    error: Option<std::io::Error>,
}

impl<W: Write> DeltaWriter<W> {
    fn new(out: W) -> Self {
        Self { out, error: None }
    }

    fn push(&mut self, delta: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.out.write_all(delta.as_bytes()).and_then(|_| self.out.flush()) {
            log::warn!("Stopped streaming answer: {}", e);
            self.error = Some(e);
        }
    }

    fn finish(self) -> std::io::Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct BrokenPipe {
        writes: usize,
    }

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.writes += 1;
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_deltas_are_written_in_order() {
        let mut out = DeltaWriter::new(Vec::new());
        out.push("Chunking ");
        out.push("splits text.");
        assert!(out.error.is_none());
        assert_eq!(out.out, b"Chunking splits text.");
        assert!(out.finish().is_ok());
    }

    #[test]
    fn test_write_failure_is_reported_once() {
        let mut out = DeltaWriter::new(BrokenPipe { writes: 0 });
        out.push("first");
        out.push("second");
        assert_eq!(out.out.writes, 1);

        let err = out.finish().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
