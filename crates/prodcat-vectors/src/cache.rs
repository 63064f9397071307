//! Process-lifetime word-vector cache.
//!
//! Unbounded and never expires: the word vocabulary seen in product titles
//! is small and vectors do not change while the process runs.

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Default)]
pub struct VectorCache {
    entries: Mutex<HashMap<String, Vec<f32>>>,
}

impl VectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, word: &str) -> Option<Vec<f32>> {
        self.entries.lock().get(word).cloned()
    }

    pub fn put(&self, word: impl Into<String>, vector: Vec<f32>) {
        self.entries.lock().insert(word.into(), vector);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
