//! Category attribute schemas.
//!
//! The reference source is one JSON document mapping category id to
//! `CategorySchema`. `TtlSchemaRetriever` caches the whole document, so an
//! expired cache costs one fetch regardless of how many categories are read.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use prodcat_core::{CategorySchema, Error, Result};

pub trait SchemaRetriever: Send + Sync {
    /// Schema for `category_id`, or `None` when the category is unknown.
    fn get(&self, category_id: &str) -> Result<Option<CategorySchema>>;
}

/// Blob storage holding the schema document.
pub trait ObjectStore: Send + Sync {
    fn get_object(&self, key: &str) -> Result<Vec<u8>>;
}

/// Objects are files under `root`.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ObjectStore for FsObjectStore {
    fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.root.join(key);
        std::fs::read(&path)
            .map_err(|e| Error::Storage(format!("Failed to read {}: {}", path.display(), e)))
    }
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects.lock().insert(key.into(), bytes);
    }

    /// Number of `get_object` calls so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("No such object: {}", key)))
    }
}

pub type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

struct CachedDocument {
    loaded_at: Instant,
    schemas: Arc<Map<String, Value>>,
}

/// Loads the schema document from an object store and keeps it for `ttl`.
pub struct TtlSchemaRetriever {
    store: Arc<dyn ObjectStore>,
    key: String,
    ttl: Duration,
    clock: Clock,
    cached: Mutex<Option<CachedDocument>>,
}

impl TtlSchemaRetriever {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>, ttl: Duration) -> Self {
        Self::with_clock(store, key, ttl, Arc::new(Instant::now))
    }

    pub fn with_clock(
        store: Arc<dyn ObjectStore>,
        key: impl Into<String>,
        ttl: Duration,
        clock: Clock,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            ttl,
            clock,
            cached: Mutex::new(None),
        }
    }

    fn document(&self) -> Result<Arc<Map<String, Value>>> {
        let now = (self.clock)();
        let mut cached = self.cached.lock();

        if let Some(doc) = cached.as_ref() {
            if now.saturating_duration_since(doc.loaded_at) < self.ttl {
                return Ok(doc.schemas.clone());
            }
            debug!("Schema document {} expired", self.key);
        }

        let bytes = self.store.get_object(&self.key).map_err(|e| {
            Error::Storage(format!("Failed to load schema document {}: {}", self.key, e))
        })?;
        let schemas: Map<String, Value> = serde_json::from_slice(&bytes)?;
        info!("Loaded schema document {}: {} categories", self.key, schemas.len());

        let schemas = Arc::new(schemas);
        *cached = Some(CachedDocument {
            loaded_at: now,
            schemas: schemas.clone(),
        });
        Ok(schemas)
    }
}

impl SchemaRetriever for TtlSchemaRetriever {
    fn get(&self, category_id: &str) -> Result<Option<CategorySchema>> {
        let document = self.document()?;
        match document.get(category_id) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => {
                error!("Category {} not found in schema document", category_id);
                Ok(None)
            }
        }
    }
}

/// Fixed schemas held in memory.
#[derive(Default)]
pub struct StaticSchemaRetriever {
    schemas: HashMap<String, CategorySchema>,
}

impl StaticSchemaRetriever {
    pub fn new(schemas: HashMap<String, CategorySchema>) -> Self {
        Self { schemas }
    }
}

impl SchemaRetriever for StaticSchemaRetriever {
    fn get(&self, category_id: &str) -> Result<Option<CategorySchema>> {
        Ok(self.schemas.get(category_id).cloned())
    }
}
