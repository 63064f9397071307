//! Wiring of the three stages for one catalog.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use prodcat_core::{
    Attributes, Catalog, CatalogConfig, CategorizationPrediction, MetaclassPrediction, Product,
    Result,
};
use prodcat_llm::{ModelClient, ModelConfig, ModelInvoker};
use prodcat_text::TextCleaner;
use prodcat_vectors::{CachedRemoteVectorRepository, CategoryVectorIndex, EmbeddingStore};

use crate::attributes::AttributesExtractor;
use crate::metaclass::{MetaclassClassifier, TitleNormalizer};
use crate::product::ProductClassifier;
use crate::schema::{ObjectStore, TtlSchemaRetriever};

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub metaclass: MetaclassPrediction,
    pub categorization: CategorizationPrediction,
    pub attributes: Attributes,
}

pub struct Pipeline {
    metaclass: MetaclassClassifier,
    classifier: ProductClassifier,
    extractor: AttributesExtractor,
    demo: bool,
}

impl Pipeline {
    pub fn new(
        metaclass: MetaclassClassifier,
        classifier: ProductClassifier,
        extractor: AttributesExtractor,
        demo: bool,
    ) -> Self {
        Self {
            metaclass,
            classifier,
            extractor,
            demo,
        }
    }

    /// Load the catalog and build every stage around the given stores and model client.
    pub fn build(
        catalog_config: &CatalogConfig,
        model_config: &ModelConfig,
        embeddings: Arc<dyn EmbeddingStore>,
        schema_store: Arc<dyn ObjectStore>,
        client: Arc<dyn ModelClient>,
    ) -> Result<Self> {
        let catalog = Arc::new(Catalog::load(catalog_config)?);
        let cleaner = Arc::new(TextCleaner::new(&catalog.lexicon, catalog_config.language)?);
        let index = Arc::new(CategoryVectorIndex::from_catalog(
            &catalog,
            catalog_config.embedding_dim,
        )?);
        let vectors = Arc::new(CachedRemoteVectorRepository::new(embeddings));
        let invoker = Arc::new(ModelInvoker::with_retry_policy(
            client,
            model_config.retry_policy(),
        ));

        let mut metaclass = MetaclassClassifier::new(catalog.clone(), cleaner, index, vectors);
        if let Some(model_id) = model_config.normalization_model.as_deref() {
            metaclass = metaclass.with_normalizer(TitleNormalizer::new(
                invoker.clone(),
                model_id,
                catalog_config.language,
            ));
        }

        let classifier = ProductClassifier::new(
            catalog,
            invoker.clone(),
            model_config.categorization_model.clone(),
        )
        .with_max_tokens(model_config.max_tokens)
        .with_include_prompt(catalog_config.demo);

        let schemas = Arc::new(TtlSchemaRetriever::new(
            schema_store,
            catalog_config.paths.schema_document.clone(),
            Duration::from_secs(catalog_config.schema_ttl_secs),
        ));
        let extractor =
            AttributesExtractor::new(schemas, invoker, model_config.extraction_model.clone())
                .with_max_tokens(model_config.max_tokens);

        info!(
            "Pipeline ready: language={}, demo={}",
            catalog_config.language, catalog_config.demo
        );

        Ok(Self::new(metaclass, classifier, extractor, catalog_config.demo))
    }

    pub fn metaclass(&self) -> &MetaclassClassifier {
        &self.metaclass
    }

    pub fn classifier(&self) -> &ProductClassifier {
        &self.classifier
    }

    pub fn extractor(&self) -> &AttributesExtractor {
        &self.extractor
    }

    /// Metaclass, then categorization among its candidates, then attribute
    /// extraction for the predicted category. A dry run skips extraction.
    pub fn run(&self, product: &Product, dryrun: bool) -> Result<PipelineOutput> {
        let metaclass = self.metaclass.classify(product)?;
        let categorization = self.classifier.classify(
            product,
            &metaclass.possible_categories,
            self.demo,
            dryrun,
        )?;

        let attributes = if dryrun {
            Attributes::empty()
        } else {
            self.extractor
                .extract_attributes(product, &categorization.predicted_category_id)?
        };

        let metaclass = if self.demo {
            metaclass
        } else {
            metaclass.without_diagnostics()
        };

        Ok(PipelineOutput {
            metaclass,
            categorization,
            attributes,
        })
    }
}
