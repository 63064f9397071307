//! Word-vector lookup with an in-process cache in front of a batched store.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::cache::VectorCache;
use crate::index::l2_normalize;
use crate::store::EmbeddingStore;
use prodcat_core::{Error, Result};

/// Source of unit-normalized word vectors.
pub trait VectorRepository: Send + Sync {
    /// One entry per input word, in input order. `None` means the word has
    /// no embedding and should be skipped by the caller.
    fn get_vectors_by_words(&self, words: &[String]) -> Result<Vec<Option<Vec<f32>>>>;

    fn cache_vector(&self, word: &str, vector: Vec<f32>);

    fn get_cached_vector(&self, word: &str) -> Option<Vec<f32>>;
}

/// Retry budget for keys a store leaves unprocessed.
#[derive(Debug, Clone)]
pub struct BatchRetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each subsequent one.
    pub base_delay: Duration,
}

impl Default for BatchRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

pub struct CachedRemoteVectorRepository {
    store: Arc<dyn EmbeddingStore>,
    cache: VectorCache,
    retry: BatchRetryPolicy,
}

impl CachedRemoteVectorRepository {
    /// Maximum keys sent to the store per call.
    pub const MAX_BATCH_KEYS: usize = 100;

    pub fn new(store: Arc<dyn EmbeddingStore>) -> Self {
        Self::with_retry_policy(store, BatchRetryPolicy::default())
    }

    pub fn with_retry_policy(store: Arc<dyn EmbeddingStore>, retry: BatchRetryPolicy) -> Self {
        Self {
            store,
            cache: VectorCache::new(),
            retry,
        }
    }

    pub fn cached_words(&self) -> usize {
        self.cache.len()
    }

    /// Fetch one chunk, re-requesting unprocessed keys with exponential backoff.
    fn fetch_chunk(&self, chunk: &[String]) -> Result<Vec<(String, Vec<f32>)>> {
        let mut pending = chunk.to_vec();
        let mut items = Vec::with_capacity(chunk.len());
        let mut delay = self.retry.base_delay;
        let mut retries = 0u32;

        loop {
            let out = self.store.batch_get(&pending)?;
            items.extend(out.items);
            if out.unprocessed.is_empty() {
                return Ok(items);
            }
            if retries >= self.retry.max_retries {
                return Err(Error::UnprocessedKeys {
                    remaining: out.unprocessed.len(),
                    attempts: retries,
                });
            }

            retries += 1;
            warn!(
                "{} keys unprocessed, retry {}/{} in {:?}",
                out.unprocessed.len(),
                retries,
                self.retry.max_retries,
                delay
            );
            std::thread::sleep(delay);
            delay *= 2;
            pending = out.unprocessed;
        }
    }
}

impl VectorRepository for CachedRemoteVectorRepository {
    fn get_vectors_by_words(&self, words: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; words.len()];
        // Miss word → every input position holding it.
        let mut misses: IndexMap<&str, Vec<usize>> = IndexMap::new();

        for (i, word) in words.iter().enumerate() {
            match self.cache.get(word) {
                Some(v) => results[i] = Some(v),
                None => misses.entry(word.as_str()).or_default().push(i),
            }
        }

        if misses.is_empty() {
            return Ok(results);
        }

        let keys: Vec<String> = misses.keys().map(|k| k.to_string()).collect();
        let mut found = 0usize;
        for chunk in keys.chunks(Self::MAX_BATCH_KEYS) {
            for (word, raw) in self.fetch_chunk(chunk)? {
                let vector = l2_normalize(raw);
                if let Some(positions) = misses.get(word.as_str()) {
                    for &i in positions {
                        results[i] = Some(vector.clone());
                    }
                }
                self.cache.put(word, vector);
                found += 1;
            }
        }

        debug!(
            "Vector lookup: {} words, {} cache misses, {} found remotely",
            words.len(),
            keys.len(),
            found
        );
        Ok(results)
    }

    fn cache_vector(&self, word: &str, vector: Vec<f32>) {
        self.cache.put(word, vector);
    }

    fn get_cached_vector(&self, word: &str) -> Option<Vec<f32>> {
        self.cache.get(word)
    }
}
