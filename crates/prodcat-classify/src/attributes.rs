//! Attribute extraction for a chosen category.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use prodcat_core::{Attributes, CategorySchema, Error, Product, Result};
use prodcat_llm::{json_to_xml, parse_response, ConverseRequest, Message, ModelInvoker, ResponseFrame};

use crate::prompts;
use crate::schema::SchemaRetriever;

pub struct AttributesExtractor {
    schemas: Arc<dyn SchemaRetriever>,
    invoker: Arc<ModelInvoker>,
    model_id: String,
    max_tokens: u32,
    frame: ResponseFrame,
}

impl AttributesExtractor {
    pub fn new(
        schemas: Arc<dyn SchemaRetriever>,
        invoker: Arc<ModelInvoker>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            schemas,
            invoker,
            model_id: model_id.into(),
            max_tokens: 4096,
            frame: ResponseFrame::new("<response><scratchpad>", "</response>"),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Extract attributes for `category_id`. Unknown categories and
    /// categories without an attribute schema yield an empty list without
    /// calling the model.
    pub fn extract_attributes(&self, product: &Product, category_id: &str) -> Result<Attributes> {
        let Some(schema) = self.schemas.get(category_id)? else {
            return Ok(Attributes::empty());
        };
        debug!("Category schema for {}: {:?}", category_id, schema);

        let Some(attributes_schema) = schema.attributes_schema.as_ref() else {
            warn!("Category {} has no attribute schema", schema.category_name);
            return Ok(Attributes::empty());
        };

        let prompt = self.create_prompt(&schema, attributes_schema, product);
        let request = ConverseRequest::new(
            self.model_id.clone(),
            self.frame.seed(&[Message::user(prompt)]),
        )
        .with_stop_sequence(self.frame.close.clone())
        .with_max_tokens(self.max_tokens);

        let response = self.invoker.invoke(&request)?;
        let full = self.frame.build_full_response(&response)?;
        let attributes = parse_attributes(&full)?;

        info!("Extracted {} attributes for category {}", attributes.len(), category_id);
        Ok(attributes)
    }

    fn create_prompt(&self, schema: &CategorySchema, attributes_schema: &Value, product: &Product) -> String {
        let prompt = prompts::extraction_prompt(
            &schema.category_name,
            &schema.subcategory_name,
            &json_to_xml(attributes_schema),
            product,
        );
        debug!("Extraction prompt: {}", prompt);
        prompt
    }
}

/// Read `response.attributes.attribute`, accepting one item or a list.
fn parse_attributes(full_response: &str) -> Result<Attributes> {
    let fail = |reason: String| {
        error!("Failed to parse extracted attributes ({}) from response: {}", reason, full_response);
        Error::ModelResponse("Failed to parse extracted attributes from response".into())
    };

    let parsed = parse_response(full_response, &[]).map_err(|e| fail(e.to_string()))?;
    let items = match &parsed["response"]["attributes"]["attribute"] {
        Value::Null => return Err(fail("no attribute element".into())),
        Value::Array(items) => items.clone(),
        single => vec![single.clone()],
    };

    serde_json::from_value(json!({ "attributes": items })).map_err(|e| fail(e.to_string()))
}
