//! Data types for products, taxonomy nodes, predictions and attributes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A product as submitted for onboarding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    /// General product copy, not a category label.
    pub description: String,
    /// Unstructured text from the manufacturer or distributor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl Product {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    /// Title, short description and description joined by single spaces.
    pub fn combined_text(&self) -> String {
        let mut parts = vec![self.title.as_str()];
        if let Some(short) = self.short_description.as_deref() {
            if !short.trim().is_empty() {
                parts.push(short);
            }
        }
        if !self.description.trim().is_empty() {
            parts.push(self.description.as_str());
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseCategory {
    pub id: String,
    pub name: String,
}

/// A taxonomy node. Only leaves (no `childs`) are valid classification targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Root-first path, ending with this node.
    pub full_path: Vec<BaseCategory>,
    #[serde(default)]
    pub childs: Vec<BaseCategory>,
    /// Products used for few-shot prompting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<Product>>,
}

impl ProductCategory {
    /// Root-to-leaf names joined with " > ".
    pub fn formatted_path(&self) -> String {
        self.full_path
            .iter()
            .map(|level| level.name.as_str())
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

/// How a category word was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    ExactMatch,
    WordEmb,
    Other,
}

impl std::fmt::Display for FindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingType::ExactMatch => write!(f, "exact_match"),
            FindingType::WordEmb => write!(f, "word_emb"),
            FindingType::Other => write!(f, "other"),
        }
    }
}

/// A category-vocabulary word matched in the cleaned text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordFinding {
    /// Token index in the cleaned text, or -1 when nothing matched.
    pub position: i64,
    #[serde(rename = "type")]
    pub kind: FindingType,
    /// The vocabulary word, which may differ from the input token.
    pub word: String,
    pub score: f32,
}

/// Output of the metaclass stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaclassPrediction {
    pub possible_categories: Vec<String>,
    #[serde(default)]
    pub clean_title: Option<String>,
    #[serde(default)]
    pub findings: Option<Vec<WordFinding>>,
}

impl MetaclassPrediction {
    /// Drop the diagnostic fields (non-demo responses).
    pub fn without_diagnostics(mut self) -> Self {
        self.clean_title = None;
        self.findings = None;
        self
    }
}

/// Output of the categorization stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationPrediction {
    pub predicted_category_id: String,
    pub predicted_category_name: String,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Attribute schema for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySchema {
    pub category_name: String,
    pub subcategory_name: String,
    /// `None` means the category defines no attributes.
    #[serde(default)]
    pub attributes_schema: Option<serde_json::Value>,
}

/// An extracted attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn scalar(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: AttributeValue::Scalar(value.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Scalar(String),
    List(Vec<String>),
    Nested(IndexMap<String, Attribute>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    pub attributes: Vec<Attribute>,
}

impl Attributes {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}
