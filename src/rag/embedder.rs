//! Batched text embedding against OpenAI-compatible endpoints.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cache::{ClientCache, ClientKey};

/// Default number of inputs per embedding request.
pub const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Embedding service returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid embedding configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// A service that turns one batch of strings into vectors.
pub trait EmbeddingBackend: Send + Sync {
    /// Embed `inputs`, returning one vector per input in the same order.
    fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Blocking embeddings client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbeddingBackend {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiEmbeddingBackend {
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::InvalidConfig("missing embedding API key".into()));
        }
        if model.trim().is_empty() {
            return Err(EmbeddingError::InvalidConfig("missing embedding model name".into()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| EmbeddingError::InvalidConfig("invalid embedding API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

impl EmbeddingBackend for OpenAiEmbeddingBackend {
    fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let resp = self.client.post(&self.endpoint).json(&request).send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingResponse = resp.json()?;
        parsed.data.sort_by_key(|entry| entry.index);
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Splits work into batches and validates what the backend returns.
pub struct Embedder {
    backend: Arc<dyn EmbeddingBackend>,
    batch_size: usize,
}

impl Embedder {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "batch size must be greater than zero".into(),
            ));
        }
        Ok(Self { backend, batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed `texts`, one vector per text, in input order.
    ///
    /// Batches are sent sequentially. Any failing batch fails the whole call;
    /// partial results are never returned.
    pub fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let cleaned: Vec<String> = texts.iter().map(|t| t.replace('\n', " ")).collect();
        let mut vectors = Vec::with_capacity(cleaned.len());
        let mut dimensions: Option<usize> = None;

        for batch in cleaned.chunks(self.batch_size) {
            let embedded = self.backend.embed_batch(batch)?;
            if embedded.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: embedded.len(),
                });
            }

            for vector in &embedded {
                let expected = *dimensions.get_or_insert(vector.len());
                if vector.len() != expected {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
            }
            vectors.extend(embedded);
        }

        log::debug!("Embedded {} texts in batches of {}", texts.len(), self.batch_size);
        Ok(vectors)
    }

    /// Embed a single query string.
    pub fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(&[text.to_string()])?
            .pop()
            .ok_or(EmbeddingError::CountMismatch {
                expected: 1,
                actual: 0,
            })
    }
}

/// Connection settings for an embedding service.
#[derive(Debug, Clone)]
pub struct EmbedderSpec<'a> {
    pub api_key: &'a str,
    pub base_url: &'a str,
    pub model: &'a str,
    pub batch_size: usize,
    pub timeout: Duration,
}

/// Credentials plus the batch size and timeout the embedder is built with.
type EmbedderKey = (ClientKey, usize, Duration);

fn embedder_cache() -> &'static ClientCache<Embedder, EmbedderKey> {
    static CACHE: OnceLock<ClientCache<Embedder, EmbedderKey>> = OnceLock::new();
    CACHE.get_or_init(ClientCache::new)
}

/// Get the shared embedder for these settings, building it on first use.
pub fn load_embedder(spec: &EmbedderSpec<'_>) -> Result<Arc<Embedder>> {
    let key = (
        ClientKey::new(spec.api_key, spec.base_url, spec.model),
        spec.batch_size,
        spec.timeout,
    );
    embedder_cache().get_or_try_init(&key, || {
        log::info!("Creating embedding client for model {}", spec.model);
        let backend =
            OpenAiEmbeddingBackend::new(spec.api_key, spec.base_url, spec.model, spec.timeout)?;
        Embedder::new(Arc::new(backend), spec.batch_size)
    })
}
