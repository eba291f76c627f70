//! Recall-then-rerank retrieval producing a prompt-ready context string.

use super::embedder::{Embedder, EmbeddingError};
use super::models::Candidate;
use super::reranker::{RerankStatus, Reranker};
use super::store::VectorSearch;

/// Candidate counts for the two retrieval stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    /// Candidates recalled from the store when a reranker will narrow them
    pub top_k_recall: usize,
    /// Candidates finally kept
    pub top_k_rerank: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            top_k_recall: 50,
            top_k_rerank: 5,
        }
    }
}

/// What one retrieval produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    /// Formatted context blocks; empty when nothing was found
    pub context: String,
    pub candidates: Vec<Candidate>,
    /// `None` when no reranker took part
    pub rerank: Option<RerankStatus>,
}

impl Retrieval {
    pub(crate) fn empty() -> Self {
        Self {
            context: String::new(),
            candidates: Vec::new(),
            rerank: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }
}

/// Retrieve context for `query`.
///
/// Without a reranker only `top_k_rerank` candidates are recalled. Embedding
/// the query is the only failure that reaches the caller; a failing store
/// query is logged and yields an empty retrieval.
pub fn search_vectors(
    embedder: &Embedder,
    store: &dyn VectorSearch,
    query: &str,
    reranker: Option<&Reranker>,
    params: SearchParams,
) -> Result<Retrieval, EmbeddingError> {
    let query_vector = embedder.encode_one(query)?;

    let recall_k = if reranker.is_some() {
        params.top_k_recall
    } else {
        params.top_k_rerank
    };

    let candidates = match store.query(&query_vector, recall_k) {
        Ok(candidates) => candidates,
        Err(e) => {
            log::error!("Vector recall failed: {}", e);
            return Ok(Retrieval::empty());
        }
    };
    if candidates.is_empty() {
        return Ok(Retrieval::empty());
    }

    let (candidates, rerank) = match reranker {
        Some(reranker) => {
            let outcome = reranker.rerank(query, candidates, params.top_k_rerank);
            (outcome.candidates, Some(outcome.status))
        }
        None => (candidates, None),
    };

    Ok(Retrieval {
        context: format_context(&candidates),
        candidates,
        rerank,
    })
}

/// Render candidates as labeled blocks separated by blank lines.
pub fn format_context(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|c| {
            format!(
                "[local: {} | {} | score: {:.4}]\n{}",
                c.source,
                c.page.label(),
                c.score,
                c.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
