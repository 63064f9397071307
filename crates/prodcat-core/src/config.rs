//! Configuration and catalog directory layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Paths to the catalog files inside a configuration directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPaths {
    /// Root configuration directory (e.g., `config/`).
    pub root: PathBuf,
    /// Category id → ProductCategory (`category_tree.json`).
    pub category_tree: PathBuf,
    /// Vocabulary word → category ids (`word_map.json`).
    pub word_map: PathBuf,
    /// Vocabulary word → raw vector (`category_vectors.json`).
    pub category_vectors: PathBuf,
    /// Category ids always offered as candidates (`always_categories.json`).
    pub always_categories: PathBuf,
    /// Optional: brand names removed during cleaning (`brands.json`).
    pub brands: PathBuf,
    /// Optional: singularization exceptions (`singularize.json`).
    pub singularize: PathBuf,
    /// Optional: synonym substitutions (`synonyms.json`).
    pub synonyms: PathBuf,
    /// Optional: descriptor words removed during cleaning (`descriptors.json`).
    pub descriptors: PathBuf,
    /// Attribute schema document, relative to the schema store root.
    pub schema_document: String,
}

impl CatalogPaths {
    /// Lay out catalog paths under `root`. Does not touch the filesystem.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            category_tree: root.join("category_tree.json"),
            word_map: root.join("word_map.json"),
            category_vectors: root.join("category_vectors.json"),
            always_categories: root.join("always_categories.json"),
            brands: root.join("brands.json"),
            singularize: root.join("singularize.json"),
            synonyms: root.join("synonyms.json"),
            descriptors: root.join("descriptors.json"),
            schema_document: "attributes_schema.json".into(),
            root,
        }
    }
}

/// Stopword language for the text cleaner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Spanish,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::English => write!(f, "english"),
            Language::Spanish => write!(f, "spanish"),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "spanish" | "es" => Ok(Language::Spanish),
            other => Err(Error::Config(format!("Unsupported language: {}", other))),
        }
    }
}

/// Top-level catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub paths: CatalogPaths,
    /// Dimensionality of category and word vectors.
    pub embedding_dim: usize,
    pub language: Language,
    /// Demo mode: return prompts and metaclass diagnostics.
    pub demo: bool,
    /// Lifetime of the cached attribute schema document.
    pub schema_ttl_secs: u64,
}

impl CatalogConfig {
    pub const DEFAULT_EMBEDDING_DIM: usize = 300;
    pub const DEFAULT_SCHEMA_TTL_SECS: u64 = 300;

    /// Create configuration from environment and defaults.
    pub fn from_env(config_dir: impl AsRef<Path>) -> Result<Self> {
        let embedding_dim = match std::env::var("PRODCAT_EMBEDDING_DIM") {
            Ok(v) => v
                .parse()
                .map_err(|_| Error::Config(format!("PRODCAT_EMBEDDING_DIM is not a number: {}", v)))?,
            Err(_) => Self::DEFAULT_EMBEDDING_DIM,
        };

        let language = match std::env::var("PRODCAT_LANGUAGE") {
            Ok(v) => v.parse()?,
            Err(_) => Language::default(),
        };

        let demo = std::env::var("PRODCAT_DEMO")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let schema_ttl_secs = std::env::var("PRODCAT_SCHEMA_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_SCHEMA_TTL_SECS);

        let mut paths = CatalogPaths::new(config_dir);
        if let Ok(doc) = std::env::var("PRODCAT_SCHEMA_DOCUMENT") {
            paths.schema_document = doc;
        }

        Ok(Self {
            paths,
            embedding_dim,
            language,
            demo,
            schema_ttl_secs,
        })
    }
}
