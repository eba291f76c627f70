//! Document ingestion: chunk, embed, store.

use thiserror::Error;

use super::chunker::chunk_document;
use super::embedder::{Embedder, EmbeddingError};
use super::extract::ExtractionError;
use super::models::ChunkingConfig;
use super::store::{VectorStore, VectorStoreError};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Store failed: {0}")]
    Store(#[from] VectorStoreError),
}

/// An uploaded document.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Outcome of ingesting several files.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Chunks stored across all files
    pub inserted: usize,
    pub succeeded: Vec<(String, usize)>,
    pub failed: Vec<(String, IngestError)>,
}

/// Ingest one document. Nothing is stored unless every chunk was embedded.
pub fn ingest_file(
    embedder: &Embedder,
    store: &VectorStore,
    filename: &str,
    bytes: &[u8],
    config: &ChunkingConfig,
) -> Result<usize, IngestError> {
    let chunks = chunk_document(bytes, filename, config)?;
    let texts: Vec<String> = chunks.iter().map(|c| c.content().to_string()).collect();
    let vectors = embedder.encode(&texts)?;
    Ok(store.add(&chunks, &vectors)?)
}

/// Ingest documents one after another; a failing file does not stop the rest.
pub fn ingest_files(
    embedder: &Embedder,
    store: &VectorStore,
    files: &[SourceFile],
    config: &ChunkingConfig,
) -> IngestReport {
    let mut report = IngestReport::default();

    for file in files {
        match ingest_file(embedder, store, &file.filename, &file.bytes, config) {
            Ok(count) => {
                log::info!("Ingested {} ({} chunks)", file.filename, count);
                report.inserted += count;
                report.succeeded.push((file.filename.clone(), count));
            }
            Err(e) => {
                log::warn!("Skipping {}: {}", file.filename, e);
                report.failed.push((file.filename.clone(), e));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::embedder::tests::FakeEmbeddingBackend;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn file(name: &str, body: &str) -> SourceFile {
        SourceFile {
            filename: name.to_string(),
            bytes: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_batch_continues_past_failures() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open_in(dir.path()).unwrap();
        let embedder = Embedder::new(Arc::new(FakeEmbeddingBackend::default()), 10).unwrap();

        let files = vec![
            file("a.txt", &"a".repeat(700)),
            file("slides.pptx", "nope"),
            file("empty.txt", "   "),
            file("b.txt", "short"),
        ];
        let report = ingest_files(&embedder, &store, &files, &ChunkingConfig::default());

        assert_eq!(report.inserted, 3);
        assert_eq!(
            report.succeeded,
            vec![("a.txt".to_string(), 2), ("b.txt".to_string(), 1)]
        );
        let failed: Vec<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(failed, vec!["slides.pptx", "empty.txt"]);
        assert!(matches!(
            report.failed[0].1,
            IngestError::Extraction(ExtractionError::Unsupported(_))
        ));
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_embedding_failure_stores_nothing() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open_in(dir.path()).unwrap();
        let backend = Arc::new(FakeEmbeddingBackend {
            fail_on_call: Some(1),
            ..Default::default()
        });
        let embedder = Embedder::new(backend, 1).unwrap();

        let err = ingest_file(
            &embedder,
            &store,
            "long.txt",
            "w".repeat(1500).as_bytes(),
            &ChunkingConfig::default(),
        )
        .unwrap_err();

        assert!(matches!(err, IngestError::Embedding(_)));
        assert_eq!(store.count().unwrap(), 0);
    }
}
