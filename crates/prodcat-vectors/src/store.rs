//! Key-value word-embedding stores.
//!
//! A store answers batched lookups. Keys it did not get to are reported
//! back as `unprocessed` so the caller can retry them; keys that simply
//! have no vector are left out of both lists.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::quantize::{decode, Quantized};
use prodcat_core::{Error, Result};

/// Result of one batched lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetOutput {
    /// Found words and their raw (unnormalized) vectors.
    pub items: Vec<(String, Vec<f32>)>,
    /// Keys the store did not process in this call.
    pub unprocessed: Vec<String>,
}

pub trait EmbeddingStore: Send + Sync {
    fn batch_get(&self, keys: &[String]) -> Result<BatchGetOutput>;
}

/// Vectors held in memory. `serve_limit` caps how many keys one call
/// processes, which makes partial batches reproducible in tests.
#[derive(Default)]
pub struct InMemoryEmbeddingStore {
    vectors: HashMap<String, Vec<f32>>,
    serve_limit: Option<usize>,
    calls: AtomicUsize,
}

impl InMemoryEmbeddingStore {
    pub fn new(vectors: HashMap<String, Vec<f32>>) -> Self {
        Self {
            vectors,
            ..Default::default()
        }
    }

    pub fn with_serve_limit(mut self, limit: usize) -> Self {
        self.serve_limit = Some(limit);
        self
    }

    /// Number of `batch_get` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingStore for InMemoryEmbeddingStore {
    fn batch_get(&self, keys: &[String]) -> Result<BatchGetOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let served = self.serve_limit.unwrap_or(keys.len()).min(keys.len());

        let items = keys[..served]
            .iter()
            .filter_map(|k| self.vectors.get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        Ok(BatchGetOutput {
            items,
            unprocessed: keys[served..].to_vec(),
        })
    }
}

/// SQLite-backed store. Vectors are kept uint8-quantized with per-row
/// scale and offset, so reads are lossy: each component comes back within
/// half a quantization step of what was written.
pub struct SqliteEmbeddingStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    dim: usize,
}

impl SqliteEmbeddingStore {
    /// Most keys served by one `batch_get`; the remainder comes back unprocessed.
    pub const MAX_SERVED_PER_CALL: usize = 100;

    const SCHEMA_SQL: &'static str = "CREATE TABLE IF NOT EXISTS word_embeddings (
        word TEXT PRIMARY KEY,
        embedding BLOB NOT NULL,
        scale REAL NOT NULL,
        offset_val REAL NOT NULL
    );";

    /// Open or create `db_dir/word_embeddings.db`.
    pub fn open(db_dir: impl AsRef<Path>, dim: usize) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("word_embeddings.db");

        let conn = Connection::open(&db_path).map_err(|e| Error::Storage(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Storage(e.to_string()))?;
        conn.execute_batch(Self::SCHEMA_SQL)
            .map_err(|e| Error::Storage(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            dim,
        };
        info!(
            "SqliteEmbeddingStore opened: {} words, dim={}, path={}",
            store.count()?,
            dim,
            store.db_path.display()
        );
        Ok(store)
    }

    /// Insert or replace the vector for `word`.
    pub fn put(&self, word: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::Storage(format!(
                "Vector for '{}' has {} dimensions, expected {}",
                word,
                vector.len(),
                self.dim
            )));
        }
        let q = Quantized::encode(vector);
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT OR REPLACE INTO word_embeddings (word, embedding, scale, offset_val) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .map_err(|e| Error::Storage(e.to_string()))?
        .execute(params![word, q.bytes, q.scale as f64, q.offset as f64])
        .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn put_many<'a>(&self, entries: impl IntoIterator<Item = (&'a str, &'a [f32])>) -> Result<usize> {
        let mut n = 0;
        for (word, vector) in entries {
            self.put(word, vector)?;
            n += 1;
        }
        debug!("Stored {} word vectors", n);
        Ok(n)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM word_embeddings", [], |row| row.get(0))
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(n as usize)
    }

    fn get(&self, conn: &Connection, word: &str) -> Result<Option<Vec<f32>>> {
        let row = conn
            .prepare_cached("SELECT embedding, scale, offset_val FROM word_embeddings WHERE word = ?1")
            .map_err(|e| Error::Storage(e.to_string()))?
            .query_row(params![word], |row| {
                let blob: Vec<u8> = row.get(0)?;
                let scale: f64 = row.get(1)?;
                let offset: f64 = row.get(2)?;
                Ok((blob, scale as f32, offset as f32))
            })
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(row.map(|(blob, scale, offset)| decode(&blob, scale, offset)))
    }
}

impl EmbeddingStore for SqliteEmbeddingStore {
    fn batch_get(&self, keys: &[String]) -> Result<BatchGetOutput> {
        let served = keys.len().min(Self::MAX_SERVED_PER_CALL);
        let conn = self.conn.lock();

        let mut items = Vec::with_capacity(served);
        for key in &keys[..served] {
            if let Some(vector) = self.get(&conn, key)? {
                items.push((key.clone(), vector));
            }
        }
        Ok(BatchGetOutput {
            items,
            unprocessed: keys[served..].to_vec(),
        })
    }
}
