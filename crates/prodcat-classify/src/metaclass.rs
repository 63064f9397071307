//! Metaclass stage: narrow the taxonomy to a handful of candidate categories.
//!
//! Flow per product:
//! 1. Normalize the title (model-backed when a `TitleNormalizer` is set,
//!    otherwise the full `TextCleaner` pipeline over the product text)
//! 2. Exact lookup of each token in the word map
//! 3. Nearest category word for the remaining tokens via embeddings
//! 4. Union of the category ids behind every finding

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use prodcat_core::{
    Catalog, Error, FindingType, Language, MetaclassPrediction, Product, Result, WordFinding,
};
use prodcat_llm::{find_json, ConverseRequest, Message, ModelInvoker, ResponseFrame};
use prodcat_text::TextCleaner;
use prodcat_vectors::{CategoryVectorIndex, VectorRepository};

use crate::prompts;

/// Tokens beyond this are dropped from the cleaned title.
pub const WORD_LIMIT: usize = 20;

/// Minimum similarity for an embedding match, and the score of the fallback finding.
pub const LOW_THRESHOLD: f32 = 0.4;

/// Word-map entry used when nothing else matched.
pub const FALLBACK_WORD: &str = "other";

/// Rewrites a product into a short title with the model.
pub struct TitleNormalizer {
    invoker: Arc<ModelInvoker>,
    model_id: String,
    language: Language,
    max_tokens: u32,
    frame: ResponseFrame,
}

impl TitleNormalizer {
    pub fn new(invoker: Arc<ModelInvoker>, model_id: impl Into<String>, language: Language) -> Self {
        Self {
            invoker,
            model_id: model_id.into(),
            language,
            max_tokens: 512,
            frame: ResponseFrame::new("{\"normalized_title\": \"", "\"}"),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn normalize(&self, product: &Product) -> Result<String> {
        let prompt = prompts::normalization_prompt(product, self.language);
        let request = ConverseRequest::new(
            self.model_id.clone(),
            self.frame.seed(&[Message::user(prompt)]),
        )
        .with_stop_sequence(self.frame.close.clone())
        .with_max_tokens(self.max_tokens);

        let response = self.invoker.invoke(&request)?;
        let full = self.frame.build_full_response(&response)?;

        find_json(&full)
            .and_then(|v| v.get("normalized_title")?.as_str().map(str::to_string))
            .ok_or_else(|| {
                Error::ModelResponse(format!("Failed to parse normalized title from response: {}", full))
            })
    }
}

pub struct MetaclassClassifier {
    catalog: Arc<Catalog>,
    cleaner: Arc<TextCleaner>,
    index: Arc<CategoryVectorIndex>,
    vectors: Arc<dyn VectorRepository>,
    normalizer: Option<TitleNormalizer>,
}

impl MetaclassClassifier {
    pub fn new(
        catalog: Arc<Catalog>,
        cleaner: Arc<TextCleaner>,
        index: Arc<CategoryVectorIndex>,
        vectors: Arc<dyn VectorRepository>,
    ) -> Self {
        Self {
            catalog,
            cleaner,
            index,
            vectors,
            normalizer: None,
        }
    }

    pub fn with_normalizer(mut self, normalizer: TitleNormalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// The lower-case, singular form of the product title the lookups run on.
    pub fn clean_title(&self, product: &Product) -> Result<String> {
        match &self.normalizer {
            Some(normalizer) => {
                let normalized = normalizer.normalize(product)?;
                debug!("Normalized title: {}", normalized);
                Ok(self.cleaner.singularize_text(&normalized.to_lowercase()))
            }
            None => Ok(self.cleaner.clean_text(&product.combined_text())),
        }
    }

    pub fn classify(&self, product: &Product) -> Result<MetaclassPrediction> {
        let clean_title = self.clean_title(product)?;

        let mut tokens: Vec<&str> = clean_title.split_whitespace().collect();
        if tokens.len() > WORD_LIMIT {
            warn!(
                "Clean title has {} words, truncating to {}: {}",
                tokens.len(),
                WORD_LIMIT,
                clean_title
            );
            tokens.truncate(WORD_LIMIT);
        }

        let mut findings = Vec::new();
        let mut remaining = Vec::new();
        for (position, token) in tokens.iter().enumerate() {
            if self.catalog.word_map.contains_key(*token) {
                findings.push(WordFinding {
                    position: position as i64,
                    kind: FindingType::ExactMatch,
                    word: token.to_string(),
                    score: 1.0,
                });
            } else {
                remaining.push((position, *token));
            }
        }

        if !remaining.is_empty() {
            findings.extend(self.embedding_findings(&remaining)?);
        }

        if findings.is_empty() {
            debug!("No findings for '{}', using fallback", clean_title);
            findings.push(WordFinding {
                position: -1,
                kind: FindingType::Other,
                word: FALLBACK_WORD.to_string(),
                score: LOW_THRESHOLD,
            });
        }

        // Stable: exact matches stay ahead of equal-scoring embedding matches.
        findings.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let mut seen = HashSet::new();
        let mut possible_categories = Vec::new();
        for finding in &findings {
            for id in self.catalog.categories_for_word(&finding.word) {
                if seen.insert(id.as_str()) {
                    possible_categories.push(id.clone());
                }
            }
        }

        info!(
            "Metaclass: {} findings, {} possible categories",
            findings.len(),
            possible_categories.len()
        );

        Ok(MetaclassPrediction {
            possible_categories,
            clean_title: Some(tokens.join(" ")),
            findings: Some(findings),
        })
    }

    fn embedding_findings(&self, remaining: &[(usize, &str)]) -> Result<Vec<WordFinding>> {
        let words: Vec<String> = remaining.iter().map(|(_, w)| w.to_string()).collect();
        let vectors = self.vectors.get_vectors_by_words(&words)?;

        let mut findings = Vec::new();
        for (&(position, token), vector) in remaining.iter().zip(vectors) {
            let Some(vector) = vector else {
                warn!("Word not found in embeddings: {}", token);
                continue;
            };
            for (word, score) in self.index.search(&vector, 1, LOW_THRESHOLD)? {
                debug!("'{}' matched '{}' ({:.3})", token, word, score);
                findings.push(WordFinding {
                    position: position as i64,
                    kind: FindingType::WordEmb,
                    word,
                    score,
                });
            }
        }
        Ok(findings)
    }
}
