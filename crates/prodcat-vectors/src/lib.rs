//! Prodcat Vectors: word-embedding lookup and nearest-category search.
//!
//! - `CategoryVectorIndex`: flat cosine search over the category vocabulary
//! - `VectorRepository`: cached, batched lookup of arbitrary word vectors
//! - `EmbeddingStore`: the remote key-value backend behind the repository

pub mod cache;
pub mod index;
pub mod quantize;
pub mod repository;
pub mod store;

pub use cache::VectorCache;
pub use index::{l2_normalize, CategoryVectorIndex};
pub use repository::{BatchRetryPolicy, CachedRemoteVectorRepository, VectorRepository};
pub use store::{BatchGetOutput, EmbeddingStore, InMemoryEmbeddingStore, SqliteEmbeddingStore};
