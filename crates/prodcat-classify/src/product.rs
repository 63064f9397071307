//! Categorization stage: the model picks one category among the candidates.
//!
//! The model's answer is checked against the taxonomy. One correction round
//! is allowed; a second invalid answer fails the request.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use prodcat_core::{Catalog, CategorizationPrediction, Error, Product, ProductCategory, Result};
use prodcat_llm::{
    parse_response, ConverseRequest, ConverseResponse, Message, ModelInvoker, ResponseFrame,
    StopReason,
};

use crate::prompts::{self, CORRECTION_MESSAGE};

/// Free-text fields that may contain markup.
const CDATA_TAGS: &[&str] = &[
    "predicted_category_id",
    "predicted_category_name",
    "explanation",
];

const DRYRUN_RESPONSE: &str = "chain of thought</thinking>
<prediction>
<predicted_category_id>1234</predicted_category_id>
<predicted_category_name>Test</predicted_category_name>
<explanation>Test</explanation>
</prediction>";

pub struct ProductClassifier {
    catalog: Arc<Catalog>,
    invoker: Arc<ModelInvoker>,
    model_id: String,
    max_tokens: u32,
    include_prompt: bool,
    frame: ResponseFrame,
}

impl ProductClassifier {
    pub fn new(catalog: Arc<Catalog>, invoker: Arc<ModelInvoker>, model_id: impl Into<String>) -> Self {
        Self {
            catalog,
            invoker,
            model_id: model_id.into(),
            max_tokens: 4096,
            include_prompt: false,
            frame: ResponseFrame::new("<response>\n<thinking>", "</response>"),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Attach the prompt to every prediction, whatever the caller asks for.
    pub fn with_include_prompt(mut self, include_prompt: bool) -> Self {
        self.include_prompt = include_prompt;
        self
    }

    /// Candidate ids followed by the always-categories, deduplicated and
    /// resolved against the taxonomy. Unknown ids are skipped.
    pub fn candidates(&self, candidate_ids: &[String]) -> Vec<&ProductCategory> {
        let mut seen = HashSet::new();
        candidate_ids
            .iter()
            .chain(self.catalog.always_categories.iter())
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| {
                let category = self.catalog.category(id);
                if category.is_none() {
                    warn!("Candidate category {} not in category tree", id);
                }
                category
            })
            .collect()
    }

    pub fn render_prompt(&self, product: &Product, candidate_ids: &[String]) -> String {
        let candidates = self.candidates(candidate_ids);
        debug!("Rendering prompt with {} candidate categories", candidates.len());
        prompts::categorization_prompt(product, &candidates)
    }

    pub fn classify(
        &self,
        product: &Product,
        candidate_ids: &[String],
        include_prompt: bool,
        dryrun: bool,
    ) -> Result<CategorizationPrediction> {
        let prompt = self.render_prompt(product, candidate_ids);
        let mut messages = vec![Message::user(prompt.clone())];

        let full_response = self.complete(&messages, dryrun)?;
        let mut prediction = parse_prediction(&full_response)?;

        if !dryrun && !self.validate(&prediction) {
            warn!(
                "Invalid prediction {} ({}), asking for a correction",
                prediction.predicted_category_id, prediction.predicted_category_name
            );
            messages.push(Message::assistant(full_response.clone()));
            messages.push(Message::user(CORRECTION_MESSAGE));

            let corrected = self.complete(&messages, false)?;
            prediction = parse_prediction(&corrected)?;
            if !self.validate(&prediction) {
                error!("Hallucination detected twice: {}", full_response);
                return Err(Error::ModelResponse("Hallucination detected".into()));
            }
        }

        if let Some(category) = self.catalog.category(&prediction.predicted_category_id) {
            prediction.predicted_category_name = category.formatted_path();
        }

        if include_prompt || self.include_prompt {
            prediction.prompt = Some(prompt);
        }

        info!(
            "Predicted category {}: {}",
            prediction.predicted_category_id, prediction.predicted_category_name
        );
        Ok(prediction)
    }

    /// The id must be in the taxonomy and the predicted name must end with
    /// that category's name.
    pub fn validate(&self, prediction: &CategorizationPrediction) -> bool {
        let Some(category) = self.catalog.category(&prediction.predicted_category_id) else {
            error!(
                "Predicted category id {} not in category tree",
                prediction.predicted_category_id
            );
            return false;
        };
        if !prediction.predicted_category_name.ends_with(&category.name) {
            error!(
                "Predicted category name {} does not match category name {}",
                prediction.predicted_category_name, category.name
            );
            return false;
        }
        true
    }

    fn complete(&self, messages: &[Message], dryrun: bool) -> Result<String> {
        let response = if dryrun {
            ConverseResponse::new(DRYRUN_RESPONSE, StopReason::StopSequence)
        } else {
            let request = ConverseRequest::new(self.model_id.clone(), self.frame.seed(messages))
                .with_stop_sequence(self.frame.close.clone())
                .with_max_tokens(self.max_tokens);
            self.invoker.invoke(&request)?
        };
        self.frame.build_full_response(&response)
    }
}

fn parse_prediction(full_response: &str) -> Result<CategorizationPrediction> {
    let parsed = parse_response(full_response, CDATA_TAGS)?;

    if let Some(thinking) = parsed["response"]["thinking"].as_str() {
        debug!("Chain of thought: {}", thinking);
    }

    let prediction = &parsed["response"]["prediction"];
    let field = |name: &str| prediction[name].as_str().map(|s| s.trim().to_string());

    match (
        field("predicted_category_id"),
        field("predicted_category_name"),
        field("explanation"),
    ) {
        (Some(id), Some(name), Some(explanation)) => Ok(CategorizationPrediction {
            predicted_category_id: id,
            predicted_category_name: name,
            explanation,
            prompt: None,
        }),
        _ => {
            error!("Failed to parse prediction from response: {}", full_response);
            Err(Error::ModelResponse("Failed to parse prediction from response".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use prodcat_core::BaseCategory;
    use prodcat_llm::{RetryPolicy, ScriptedModelClient};

    fn category(id: &str, name: &str, parent: Option<(&str, &str)>) -> ProductCategory {
        let mut full_path = Vec::new();
        if let Some((pid, pname)) = parent {
            full_path.push(BaseCategory { id: pid.into(), name: pname.into() });
        }
        full_path.push(BaseCategory { id: id.into(), name: name.into() });
        ProductCategory {
            id: id.into(),
            name: name.into(),
            description: None,
            full_path,
            childs: Vec::new(),
            examples: None,
        }
    }

    fn catalog() -> Catalog {
        let mut media = category("60000000", "Media", None);
        media.childs.push(BaseCategory { id: "60010200".into(), name: "Books".into() });

        let mut taxonomy = HashMap::new();
        taxonomy.insert("60000000".to_string(), media);
        taxonomy.insert("60010200".to_string(), category("60010200", "Books", Some(("60000000", "Media"))));
        taxonomy.insert("70010100".to_string(), category("70010100", "Shoes", Some(("70000000", "Footwear"))));

        Catalog {
            taxonomy,
            always_categories: vec!["60010200".to_string()],
            ..Default::default()
        }
    }

    fn answer(id: &str, name: &str) -> String {
        format!(
            "I think about it</thinking>\n<prediction>\n<predicted_category_id>{}</predicted_category_id>\n\
             <predicted_category_name>{}</predicted_category_name>\n\
             <explanation>It is a <b>good</b> fit</explanation>\n</prediction>\n",
            id, name
        )
    }

    fn classifier() -> (ProductClassifier, Arc<ScriptedModelClient>) {
        let client = Arc::new(ScriptedModelClient::new());
        let invoker = Arc::new(ModelInvoker::with_retry_policy(client.clone(), RetryPolicy::immediate(1)));
        (ProductClassifier::new(Arc::new(catalog()), invoker, "test-model"), client)
    }

    #[test]
    fn test_candidates_deduplicated_and_resolved() {
        let (classifier, _) = classifier();
        let ids = vec!["70010100".to_string(), "60010200".to_string(), "404".to_string()];
        let candidates: Vec<&str> = classifier.candidates(&ids).into_iter().map(|c| c.id.as_str()).collect();
        assert_eq!(candidates, vec!["70010100", "60010200"]);
    }

    #[test]
    fn test_valid_prediction_gets_full_path() {
        let (classifier, client) = classifier();
        client.push_text(answer("70010100", "Shoes"), StopReason::StopSequence);

        let product = Product::new("Red Running Shoes", "Lightweight trainers");
        let pred = classifier.classify(&product, &["70010100".to_string()], false, false).unwrap();

        assert_eq!(pred.predicted_category_id, "70010100");
        assert_eq!(pred.predicted_category_name, "Footwear > Shoes");
        assert_eq!(pred.explanation, "It is a <b>good</b> fit");
        assert!(pred.prompt.is_none());

        let request = client.last_request().unwrap();
        assert_eq!(request.params.stop_sequences, vec!["</response>".to_string()]);
        assert_eq!(request.params.temperature, 0.0);
        assert_eq!(request.messages.last().unwrap().content, "<response>\n<thinking>");
    }

    #[test]
    fn test_validate_rules() {
        let (classifier, _) = classifier();
        let pred = |id: &str, name: &str| CategorizationPrediction {
            predicted_category_id: id.into(),
            predicted_category_name: name.into(),
            explanation: String::new(),
            prompt: None,
        };
        assert!(classifier.validate(&pred("70010100", "Shoes")));
        assert!(classifier.validate(&pred("70010100", "Footwear > Shoes")));
        assert!(!classifier.validate(&pred("70010100", "Boots")));
        assert!(!classifier.validate(&pred("99999999", "Shoes")));
        assert!(classifier.validate(&pred("60000000", "Media")));
    }

    #[test]
    fn test_name_suffix_match_is_literal() {
        let (classifier, _) = classifier();
        let pred = CategorizationPrediction {
            predicted_category_id: "70010100".into(),
            predicted_category_name: "XShoes".into(),
            explanation: String::new(),
            prompt: None,
        };
        assert!(classifier.validate(&pred));
    }

    #[test]
    fn test_inner_taxonomy_node_accepted_first_time() {
        let (classifier, client) = classifier();
        client
            .push_text(answer("60000000", "Media"), StopReason::StopSequence)
            .push_text(answer("60000000", "Media"), StopReason::StopSequence);

        let pred = classifier
            .classify(&Product::new("Boxed set", "Books and films"), &[], false, false)
            .unwrap();
        assert_eq!(pred.predicted_category_id, "60000000");
        assert_eq!(pred.predicted_category_name, "Media");
        assert_eq!(client.invocations(), 1);
    }

    #[test]
    fn test_include_prompt_default() {
        let (classifier, client) = classifier();
        let classifier = classifier.with_include_prompt(true);
        client.push_text(answer("60010200", "Books"), StopReason::StopSequence);

        let pred = classifier.classify(&Product::new("A novel", "Paperback"), &[], false, false).unwrap();
        let prompt = pred.prompt.unwrap();
        assert!(prompt.contains("<id>60010200</id>"));
        assert!(prompt.contains("<title>A novel</title>"));
    }

    #[test]
    fn test_missing_prediction_is_fatal() {
        let (classifier, client) = classifier();
        client.push_text("no idea</thinking>", StopReason::StopSequence);
        let err = classifier.classify(&Product::new("A novel", ""), &[], false, false).unwrap_err();
        assert_eq!(err.to_string(), "Failed to parse prediction from response");
        assert_eq!(client.invocations(), 1);
    }

    #[test]
    fn test_dryrun_makes_no_call() {
        let (classifier, client) = classifier();
        let pred = classifier.classify(&Product::new("A novel", ""), &[], true, true).unwrap();
        assert_eq!(pred.predicted_category_id, "1234");
        assert_eq!(pred.predicted_category_name, "Test");
        assert!(pred.prompt.is_some());
        assert_eq!(client.invocations(), 0);
    }
}
