//! Prodcat Core: product data model, error taxonomy, catalog configuration.

pub mod catalog;
pub mod config;
pub mod error;
pub mod types;

pub use catalog::{Catalog, Lexicon};
pub use config::{CatalogConfig, CatalogPaths, Language};
pub use error::{Error, Result};
pub use types::*;
