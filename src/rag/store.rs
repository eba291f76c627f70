//! Persistent vector store for document chunks, backed by SQLite.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

use super::models::{Candidate, Chunk, PageRef};

/// Logical collection holding every ingested chunk.
pub const COLLECTION_NAME: &str = "knowledge_base";

/// Distance metric the collection is created with.
pub const DISTANCE_METRIC: &str = "cosine";

/// Database location relative to the data directory.
pub const STORE_RELATIVE_PATH: &str = "vector_db/knowledge.sqlite3";

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chunk count ({chunks}) doesn't match vector count ({vectors})")]
    LengthMismatch { chunks: usize, vectors: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Collection '{collection}' uses metric '{found}', expected '{expected}'")]
    MetricMismatch {
        collection: String,
        expected: String,
        found: String,
    },

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;

/// Nearest-neighbour search over stored chunks.
pub trait VectorSearch {
    /// Up to `top_k` candidates, most similar first.
    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Candidate>>;
}

/// Vector store for ingested chunks.
///
/// Similarity search is an exact scan under cosine distance. The connection
/// sits behind a mutex so one store can be shared across threads; queries and
/// writes in this process take turns on it. WAL mode only lets readers in
/// other processes proceed while a write is in flight.
pub struct VectorStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl VectorStore {
    /// Open (or create) a store at the given path.
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                metric TEXT NOT NULL,
                dimensions INTEGER,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                page TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_records_collection_source
                ON records(collection, source);
            "#,
        )?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        store.ensure_collection()?;
        Ok(store)
    }

    /// Open the store at its fixed location under `data_dir`.
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        Self::open(data_dir.join(STORE_RELATIVE_PATH))
    }

    /// Get the database path.
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| VectorStoreError::LockPoisoned)
    }

    /// Create the collection if missing; verify its metric otherwise.
    fn ensure_collection(&self) -> Result<()> {
        let conn = self.lock()?;
        ensure_collection_on(&conn)
    }

    /// Store chunks with their vectors. Returns the number of records inserted.
    pub fn add(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<usize> {
        if chunks.len() != vectors.len() {
            return Err(VectorStoreError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        ensure_collection_on(&conn)?;

        let dimensions = match collection_dimensions(&conn)? {
            Some(d) => d,
            None => vectors[0].len(),
        };
        for vector in vectors {
            if vector.len() != dimensions {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: dimensions,
                    actual: vector.len(),
                });
            }
        }

        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE collections SET dimensions = ?1 WHERE name = ?2 AND dimensions IS NULL",
            params![dimensions as i64, COLLECTION_NAME],
        )?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            tx.execute(
                "INSERT INTO records (id, collection, content, source, page, embedding) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    COLLECTION_NAME,
                    chunk.content(),
                    chunk.source(),
                    chunk.page().to_string(),
                    serialize_embedding(vector),
                ],
            )?;
        }

        tx.commit()?;
        log::info!("Stored {} chunks in {}", chunks.len(), COLLECTION_NAME);
        Ok(chunks.len())
    }

    /// Distinct source filenames currently stored, sorted.
    pub fn list_sources(&self) -> Result<BTreeSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT source FROM records WHERE collection = ?1")?;
        let sources = stmt
            .query_map(params![COLLECTION_NAME], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(sources)
    }

    /// Number of records in the collection.
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![COLLECTION_NAME],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Remove every record ingested from `source`. Returns how many were removed.
    pub fn remove_source(&self, source: &str) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND source = ?2",
            params![COLLECTION_NAME, source],
        )?;
        Ok(removed)
    }

    /// Remove every record ingested from `source`, reporting success as a flag.
    ///
    /// Failures are logged, never propagated.
    pub fn delete_by_source(&self, source: &str) -> bool {
        match self.remove_source(source) {
            Ok(removed) => {
                log::info!("Deleted {} records for {}", removed, source);
                true
            }
            Err(e) => {
                log::error!("Failed to delete {}: {}", source, e);
                false
            }
        }
    }

    /// Drop the whole collection. A missing collection is not an error.
    pub fn reset(&self) {
        if let Err(e) = self.drop_collection() {
            log::error!("Failed to reset {}: {}", COLLECTION_NAME, e);
        }
    }

    fn drop_collection(&self) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM records WHERE collection = ?1", params![COLLECTION_NAME])?;
        tx.execute("DELETE FROM collections WHERE name = ?1", params![COLLECTION_NAME])?;
        tx.commit()?;
        log::info!("Collection {} reset", COLLECTION_NAME);
        Ok(())
    }
}

impl VectorSearch for VectorStore {
    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Candidate>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        if let Some(expected) = collection_dimensions(&conn)? {
            if vector.len() != expected {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut stmt = conn.prepare(
            "SELECT id, content, source, page, embedding FROM records WHERE collection = ?1",
        )?;
        let rows = stmt
            .query_map(params![COLLECTION_NAME], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Vec<u8>>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut scored: Vec<(f32, Candidate)> = Vec::with_capacity(rows.len());
        for (id, content, source, page, embedding_bytes) in rows {
            let page: PageRef = page
                .parse()
                .map_err(|reason| VectorStoreError::Corrupt { id: id.clone(), reason })?;
            let embedding = deserialize_embedding(&embedding_bytes);
            let distance = cosine_distance(vector, &embedding);

            scored.push((
                distance,
                Candidate {
                    content,
                    source,
                    page,
                    score: 1.0 - distance,
                },
            ));
        }

        // Ascending distance is descending similarity
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored.into_iter().take(top_k).map(|(_, c)| c).collect())
    }
}

fn ensure_collection_on(conn: &Connection) -> Result<()> {
    let metric: Option<String> = conn
        .query_row(
            "SELECT metric FROM collections WHERE name = ?1",
            params![COLLECTION_NAME],
            |row| row.get(0),
        )
        .optional()?;

    match metric {
        Some(found) if found != DISTANCE_METRIC => Err(VectorStoreError::MetricMismatch {
            collection: COLLECTION_NAME.to_string(),
            expected: DISTANCE_METRIC.to_string(),
            found,
        }),
        Some(_) => Ok(()),
        None => {
            conn.execute(
                "INSERT INTO collections (name, metric) VALUES (?1, ?2)",
                params![COLLECTION_NAME, DISTANCE_METRIC],
            )?;
            Ok(())
        }
    }
}

fn collection_dimensions(conn: &Connection) -> Result<Option<usize>> {
    let dims: Option<Option<i64>> = conn
        .query_row(
            "SELECT dimensions FROM collections WHERE name = ?1",
            params![COLLECTION_NAME],
            |row| row.get(0),
        )
        .optional()?;
    Ok(dims.flatten().map(|d| d as usize))
}

/// Serialize embedding as f32 little-endian bytes.
fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize embedding from binary blob.
fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine distance (`1 - cosine similarity`). Zero vectors are maximally distant.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }

    let mut dot_product = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator == 0.0 {
        return 1.0;
    }

    1.0 - dot_product / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, VectorStore) {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open_in(dir.path()).unwrap();
        (dir, store)
    }

    fn chunk(content: &str, source: &str, page: PageRef) -> Chunk {
        Chunk::new(content, source, page).unwrap()
    }

    #[test]
    fn test_cosine_distance() {
        let a = vec![1.0, 0.0, 0.0];
        assert!(cosine_distance(&a, &a).abs() < 0.001);
        assert!((cosine_distance(&a, &[0.0, 1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!((cosine_distance(&a, &[-1.0, 0.0, 0.0]) - 2.0).abs() < 0.001);
        assert_eq!(cosine_distance(&a, &[0.0, 0.0, 0.0]), 1.0);
    }

    #[test]
    fn test_embedding_blob_round_trip() {
        let values = vec![1.0f32, -2.5, 3.25];
        assert_eq!(deserialize_embedding(&serialize_embedding(&values)), values);
    }

    #[test]
    fn test_add_empty_is_noop() {
        let (_dir, store) = open_temp();
        assert_eq!(store.add(&[], &[]).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_add_requires_matching_lengths() {
        let (_dir, store) = open_temp();
        let chunks = vec![chunk("a", "a.txt", PageRef::NotApplicable)];
        let err = store.add(&chunks, &[]).unwrap_err();
        assert!(matches!(err, VectorStoreError::LengthMismatch { chunks: 1, vectors: 0 }));
    }

    #[test]
    fn test_query_empty_store_returns_nothing() {
        let (_dir, store) = open_temp();
        assert!(store.query(&[1.0, 0.0], 10).unwrap().is_empty());
    }

    #[test]
    fn test_query_orders_by_similarity() {
        let (_dir, store) = open_temp();
        let chunks = vec![
            chunk("east", "map.pdf", PageRef::page(1)),
            chunk("north", "map.pdf", PageRef::page(2)),
            chunk("north-east", "notes.txt", PageRef::NotApplicable),
        ];
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];
        assert_eq!(store.add(&chunks, &vectors).unwrap(), 3);

        let results = store.query(&[0.0, 2.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "north");
        assert_eq!(results[0].page, PageRef::page(2));
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert_eq!(results[1].content, "north-east");
        assert_eq!(results[1].page, PageRef::NotApplicable);
        assert!((results[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn test_dimensions_are_fixed_by_first_insert() {
        let (_dir, store) = open_temp();
        store
            .add(&[chunk("a", "a.txt", PageRef::NotApplicable)], &[vec![1.0, 0.0, 0.0]])
            .unwrap();

        let err = store
            .add(&[chunk("b", "b.txt", PageRef::NotApplicable)], &[vec![1.0, 0.0]])
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { expected: 3, actual: 2 }));

        let err = store.query(&[1.0, 0.0], 5).unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_mixed_dimensions_in_one_batch_rejected() {
        let (_dir, store) = open_temp();
        let chunks = vec![
            chunk("a", "a.txt", PageRef::NotApplicable),
            chunk("b", "a.txt", PageRef::NotApplicable),
        ];
        assert!(store.add(&chunks, &[vec![1.0], vec![1.0, 2.0]]).is_err());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_list_and_delete_sources() {
        let (_dir, store) = open_temp();
        let chunks = vec![
            chunk("1", "b.pdf", PageRef::page(1)),
            chunk("2", "a.txt", PageRef::NotApplicable),
            chunk("3", "b.pdf", PageRef::page(2)),
        ];
        store.add(&chunks, &[vec![1.0], vec![1.0], vec![1.0]]).unwrap();

        let sources: Vec<String> = store.list_sources().unwrap().into_iter().collect();
        assert_eq!(sources, vec!["a.txt".to_string(), "b.pdf".to_string()]);

        assert_eq!(store.remove_source("b.pdf").unwrap(), 2);
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.delete_by_source("a.txt"));
        assert!(store.list_sources().unwrap().is_empty());
    }

    #[test]
    fn test_delete_unknown_source_succeeds() {
        let (_dir, store) = open_temp();
        assert_eq!(store.remove_source("never-ingested.pdf").unwrap(), 0);
        assert!(store.delete_by_source("never-ingested.pdf"));
    }

    #[test]
    fn test_reset_drops_everything_and_tolerates_repeat() {
        let (_dir, store) = open_temp();
        store
            .add(&[chunk("a", "a.txt", PageRef::NotApplicable)], &[vec![1.0, 0.0]])
            .unwrap();

        store.reset();
        store.reset();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.query(&[1.0, 0.0, 0.0], 3).unwrap().is_empty());

        // A fresh collection accepts a new dimensionality
        store
            .add(&[chunk("b", "b.txt", PageRef::NotApplicable)], &[vec![0.0, 1.0, 0.0]])
            .unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_shared_store_serializes_threads() {
        let (_dir, store) = open_temp();
        let store = std::sync::Arc::new(store);
        store
            .add(&[chunk("seed", "seed.txt", PageRef::NotApplicable)], &[vec![1.0, 0.0]])
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let source = format!("t{}.txt", i);
                    store
                        .add(&[chunk("body", &source, PageRef::NotApplicable)], &[vec![0.0, 1.0]])
                        .unwrap();
                    assert!(!store.query(&[1.0, 0.0], 10).unwrap().is_empty());
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.count().unwrap(), 5);
        assert_eq!(store.list_sources().unwrap().len(), 5);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = VectorStore::open_in(dir.path()).unwrap();
            store
                .add(&[chunk("persisted", "p.txt", PageRef::NotApplicable)], &[vec![0.3, 0.4]])
                .unwrap();
        }

        let store = VectorStore::open_in(dir.path()).unwrap();
        let results = store.query(&[0.3, 0.4], 1).unwrap();
        assert_eq!(results[0].content, "persisted");
        assert_eq!(store.db_path(), &dir.path().join(STORE_RELATIVE_PATH));
    }

    #[test]
    fn test_metric_mismatch_is_rejected_on_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kb.sqlite3");
        drop(VectorStore::open(path.clone()).unwrap());

        let conn = Connection::open(&path).unwrap();
        conn.execute("UPDATE collections SET metric = 'l2'", []).unwrap();
        drop(conn);

        assert!(matches!(
            VectorStore::open(path),
            Err(VectorStoreError::MetricMismatch { .. })
        ));
    }
}
