//! RAG (Retrieval-Augmented Generation) pipeline: chunking, embedding,
//! vector storage, reranking and context assembly.

mod cache;
mod chunker;
mod embedder;
mod extract;
mod ingest;
mod models;
mod reranker;
mod retriever;
mod store;

pub use cache::{ClientCache, ClientKey};
pub use chunker::{chunk_document, chunk_extracted, join_windows, sliding_window, Window};
pub use embedder::{
    load_embedder, Embedder, EmbedderSpec, EmbeddingBackend, EmbeddingError,
    OpenAiEmbeddingBackend, DEFAULT_BATCH_SIZE,
};
pub use extract::{extract_text, DocumentFormat, ExtractedText, ExtractionError};
pub use ingest::{ingest_file, ingest_files, IngestError, IngestReport, SourceFile};
pub use models::{Candidate, Chunk, ChunkingConfig, PageRef, PAGE_NOT_APPLICABLE};
pub use reranker::{
    load_reranker, HttpRerankBackend, RerankBackend, RerankError, RerankHit, RerankOutcome,
    RerankStatus, Reranker, RerankerSpec, RERANK_TIMEOUT,
};
pub use retriever::{format_context, search_vectors, Retrieval, SearchParams};
pub use store::{
    VectorSearch, VectorStore, VectorStoreError, COLLECTION_NAME, DISTANCE_METRIC,
    STORE_RELATIVE_PATH,
};
