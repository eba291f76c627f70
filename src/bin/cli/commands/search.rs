use anyhow::{Context, Result};

use knowbase_lib::config::validate_retrieval;
use knowbase_lib::rag::{search_vectors, RerankStatus};

use super::truncate;
use crate::app::App;
use crate::OutputFormat;

pub fn run(
    app: &App,
    query: &str,
    recall: Option<usize>,
    rerank: Option<usize>,
    format: &OutputFormat,
) -> Result<()> {
    let mut params = app.settings.retrieval.params();
    if let Some(recall) = recall {
        params.top_k_recall = recall;
    }
    if let Some(rerank) = rerank {
        params.top_k_rerank = rerank;
    }
    validate_retrieval(&params)?;

    let embedder = app.embedder()?;
    let reranker = app.reranker()?;
    let retrieval = search_vectors(&embedder, app.store.as_ref(), query, reranker.as_deref(), params)
        .context("Search failed")?;

    let rerank_label = match &retrieval.rerank {
        None => "off".to_string(),
        Some(RerankStatus::Reranked) => "reranked".to_string(),
        Some(RerankStatus::Skipped) => "skipped".to_string(),
        Some(RerankStatus::Degraded { reason }) => format!("degraded ({})", reason),
    };

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "query": query,
                "rerank": rerank_label,
                "results": retrieval.candidates.iter().map(|c| serde_json::json!({
                    "source": c.source,
                    "page": c.page,
                    "score": c.score,
                    "content": c.content,
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if retrieval.candidates.is_empty() {
                println!("No results found for '{}'.", query);
                return Ok(());
            }

            let source_w = retrieval
                .candidates
                .iter()
                .map(|c| c.source.chars().count())
                .max()
                .unwrap_or(6)
                .clamp(6, 30);

            println!("{:<source_w$} {:<8} {:<7} {}", "Source", "Page", "Score", "Excerpt", source_w = source_w);
            println!(
                "{} {} {} {}",
                "\u{2500}".repeat(source_w),
                "\u{2500}".repeat(8),
                "\u{2500}".repeat(7),
                "\u{2500}".repeat(40)
            );

            for c in &retrieval.candidates {
                let excerpt = truncate(&c.content.replace('\n', " "), 60);
                println!(
                    "{:<source_w$} {:<8} {:<7.4} {}",
                    truncate(&c.source, source_w),
                    c.page.to_string(),
                    c.score,
                    excerpt,
                    source_w = source_w
                );
            }

            println!("\n{} results, rerank: {}", retrieval.candidates.len(), rerank_label);
        }
    }

    Ok(())
}
