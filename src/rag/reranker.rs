//! Relevance reranking with a truncation fallback.
//!
//! The reranker never fails its caller. When the scoring service is
//! unreachable or answers with something unusable, the recalled candidates are
//! truncated in recall order and the outcome is marked as degraded.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cache::{ClientCache, ClientKey};
use super::models::Candidate;

/// Timeout applied to every rerank request.
pub const RERANK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rerank service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Malformed rerank response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Rerank result index {index} out of range for {len} documents")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid rerank configuration: {0}")]
    InvalidConfig(String),
}

/// One scored document returned by the relevance service.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RerankHit {
    /// Position of the document in the request
    pub index: usize,
    pub relevance_score: f32,
}

/// A relevance-scoring service.
pub trait RerankBackend: Send + Sync {
    fn score(&self, query: &str, documents: &[&str], top_n: usize) -> Result<Vec<RerankHit>, RerankError>;
}

/// Client for `/rerank` endpoints in the Cohere/Jina/SiliconFlow shape.
pub struct HttpRerankBackend {
    client: Client,
    endpoint: String,
    model: String,
}

impl HttpRerankBackend {
    /// `endpoint` is the full rerank URL; it is not extended with a path.
    pub fn new(api_key: &str, endpoint: &str, model: &str, timeout: Duration) -> Result<Self, RerankError> {
        if endpoint.trim().is_empty() {
            return Err(RerankError::InvalidConfig("missing rerank endpoint".into()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| RerankError::InvalidConfig("invalid rerank API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
        })
    }
}

impl RerankBackend for HttpRerankBackend {
    fn score(&self, query: &str, documents: &[&str], top_n: usize) -> Result<Vec<RerankHit>, RerankError> {
        let request = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n,
            return_documents: false,
        };
        let resp = self.client.post(&self.endpoint).json(&request).send()?;

        let status = resp.status();
        let body = resp.text()?;
        parse_rerank_response(status, &body)
    }
}

/// Only a 200 answer is trusted; anything else is a service failure.
fn parse_rerank_response(status: StatusCode, body: &str) -> Result<Vec<RerankHit>, RerankError> {
    if status != StatusCode::OK {
        return Err(RerankError::Service {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    let parsed: RerankResponse = serde_json::from_str(body)?;
    Ok(parsed.results)
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [&'a str],
    top_n: usize,
    return_documents: bool,
}

#[derive(Deserialize)]
struct RerankResponse {
    #[serde(default)]
    results: Vec<RerankHit>,
}

/// How a rerank call resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum RerankStatus {
    /// Scores come from the relevance service
    Reranked,
    /// Nothing to rerank; the service was not called
    Skipped,
    /// The service failed; candidates were truncated in recall order
    Degraded { reason: String },
}

/// Result of [`Reranker::rerank`]: the candidates to keep and how they were chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankOutcome {
    pub candidates: Vec<Candidate>,
    pub status: RerankStatus,
}

impl RerankOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, RerankStatus::Degraded { .. })
    }
}

pub struct Reranker {
    backend: Arc<dyn RerankBackend>,
}

impl Reranker {
    pub fn new(backend: Arc<dyn RerankBackend>) -> Self {
        Self { backend }
    }

    /// Reorder `candidates` by relevance to `query`, keeping at most `top_k`.
    pub fn rerank(&self, query: &str, candidates: Vec<Candidate>, top_k: usize) -> RerankOutcome {
        if candidates.is_empty() {
            return RerankOutcome {
                candidates,
                status: RerankStatus::Skipped,
            };
        }

        match self.try_rerank(query, &candidates, top_k) {
            Ok(reranked) => {
                log::debug!("Reranked {} candidates down to {}", candidates.len(), reranked.len());
                RerankOutcome {
                    candidates: reranked,
                    status: RerankStatus::Reranked,
                }
            }
            Err(e) => {
                log::warn!("Rerank failed, falling back to recall order: {}", e);
                let mut fallback = candidates;
                fallback.truncate(top_k);
                RerankOutcome {
                    candidates: fallback,
                    status: RerankStatus::Degraded {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }

    fn try_rerank(&self, query: &str, candidates: &[Candidate], top_k: usize) -> Result<Vec<Candidate>, RerankError> {
        let documents: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();
        let hits = self.backend.score(query, &documents, top_k)?;

        let mut seen = vec![false; candidates.len()];
        let mut reranked = Vec::with_capacity(hits.len());
        for hit in hits {
            let original = candidates.get(hit.index).ok_or(RerankError::IndexOutOfRange {
                index: hit.index,
                len: candidates.len(),
            })?;
            if std::mem::replace(&mut seen[hit.index], true) {
                continue;
            }

            let mut candidate = original.clone();
            candidate.score = hit.relevance_score;
            reranked.push(candidate);
        }

        reranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        reranked.truncate(top_k);
        Ok(reranked)
    }
}

/// Connection settings for a rerank service.
#[derive(Debug, Clone)]
pub struct RerankerSpec<'a> {
    pub api_key: &'a str,
    pub endpoint: &'a str,
    pub model: &'a str,
    pub timeout: Duration,
}

fn reranker_cache() -> &'static ClientCache<Reranker, (ClientKey, Duration)> {
    static CACHE: OnceLock<ClientCache<Reranker, (ClientKey, Duration)>> = OnceLock::new();
    CACHE.get_or_init(ClientCache::new)
}

/// Get the shared reranker for these credentials.
///
/// Returns `Ok(None)` when no API key is configured: reranking is optional.
pub fn load_reranker(spec: &RerankerSpec<'_>) -> Result<Option<Arc<Reranker>>, RerankError> {
    if spec.api_key.trim().is_empty() {
        return Ok(None);
    }

    let key = (ClientKey::new(spec.api_key, spec.endpoint, spec.model), spec.timeout);
    reranker_cache()
        .get_or_try_init(&key, || {
            log::info!("Creating rerank client for model {}", spec.model);
            let backend = HttpRerankBackend::new(spec.api_key, spec.endpoint, spec.model, spec.timeout)?;
            Ok(Reranker::new(Arc::new(backend)))
        })
        .map(Some)
}
