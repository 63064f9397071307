//! Catalog context: taxonomy, word map and category vectors, loaded once per process.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::types::ProductCategory;

/// Word lists and dictionaries consumed by the text cleaner.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    pub brands: Vec<String>,
    pub singularize: HashMap<String, String>,
    pub synonyms: HashMap<String, String>,
    pub descriptors: Vec<String>,
}

/// Immutable reference data shared by every classification component.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Category id → taxonomy node.
    pub taxonomy: HashMap<String, ProductCategory>,
    /// Vocabulary word → category ids.
    pub word_map: HashMap<String, Vec<String>>,
    /// Vocabulary word → raw vector, in file order.
    pub category_vectors: IndexMap<String, Vec<f32>>,
    /// Category ids offered as candidates regardless of metaclass output.
    pub always_categories: Vec<String>,
    pub lexicon: Lexicon,
}

impl Catalog {
    /// Load all catalog files described by `config`.
    ///
    /// The taxonomy, word map and category vectors are required; the lexicon
    /// files and always-categories list default to empty when missing.
    pub fn load(config: &CatalogConfig) -> Result<Self> {
        let paths = &config.paths;

        let taxonomy: HashMap<String, ProductCategory> = read_json(&paths.category_tree)?;
        let word_map: HashMap<String, Vec<String>> = read_json(&paths.word_map)?;
        let category_vectors: IndexMap<String, Vec<f32>> = read_json(&paths.category_vectors)?;

        let always_categories: Vec<String> = read_optional_json(&paths.always_categories)?;
        let lexicon = Lexicon {
            brands: read_optional_json(&paths.brands)?,
            singularize: read_optional_json(&paths.singularize)?,
            synonyms: read_optional_json(&paths.synonyms)?,
            descriptors: read_optional_json(&paths.descriptors)?,
        };

        let catalog = Self {
            taxonomy,
            word_map,
            category_vectors,
            always_categories,
            lexicon,
        };
        catalog.validate(config.embedding_dim)?;

        info!(
            "Catalog loaded: {} categories, {} vocabulary words, {} category vectors, dim={}",
            catalog.taxonomy.len(),
            catalog.word_map.len(),
            catalog.category_vectors.len(),
            config.embedding_dim
        );

        Ok(catalog)
    }

    /// Check cross-file consistency that would otherwise fail deep inside a request.
    fn validate(&self, embedding_dim: usize) -> Result<()> {
        if let Some((word, v)) = self
            .category_vectors
            .iter()
            .find(|(_, v)| v.len() != embedding_dim)
        {
            return Err(Error::Config(format!(
                "Category vector for '{}' has {} dimensions, expected {}",
                word,
                v.len(),
                embedding_dim
            )));
        }

        for id in &self.always_categories {
            if !self.taxonomy.contains_key(id) {
                warn!("Always-category {} is not in the category tree", id);
            }
        }

        Ok(())
    }

    pub fn category(&self, id: &str) -> Option<&ProductCategory> {
        self.taxonomy.get(id)
    }

    /// Category ids associated with a vocabulary word.
    pub fn categories_for_word(&self, word: &str) -> &[String] {
        self.word_map.get(word).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

fn read_optional_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        warn!("No {} file found", path.display());
        return Ok(T::default());
    }
    read_json(path)
}
