//! Prodcat Classify: the three product onboarding stages.
//!
//! 1. `MetaclassClassifier`: cheap candidate narrowing from the title
//! 2. `ProductClassifier`: LLM choice among candidates, validated against the taxonomy
//! 3. `AttributesExtractor`: schema-driven attribute extraction for the chosen category

pub mod attributes;
pub mod metaclass;
pub mod pipeline;
pub mod product;
pub mod prompts;
pub mod schema;

pub use attributes::AttributesExtractor;
pub use metaclass::{MetaclassClassifier, TitleNormalizer};
pub use pipeline::{Pipeline, PipelineOutput};
pub use product::ProductClassifier;
pub use schema::{
    FsObjectStore, InMemoryObjectStore, ObjectStore, SchemaRetriever, StaticSchemaRetriever,
    TtlSchemaRetriever,
};
