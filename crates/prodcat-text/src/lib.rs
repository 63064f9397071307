//! Prodcat Text: deterministic normalization of product text.
//!
//! The `TextCleaner` turns free-form titles into a short sequence of
//! singular, lower-case tokens suitable for word-map lookup.

pub mod cleaner;
pub mod singular;
pub mod stopwords;

pub use cleaner::TextCleaner;
pub use singular::singularize;
