//! End-to-end behaviour of the three stages over a small fixture catalog.
//!
//! The catalog is written to a temp directory and loaded the same way the
//! CLI loads it. Embeddings, the schema document and the model are in-memory
//! fakes so call counts can be asserted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use prodcat_classify::{InMemoryObjectStore, Pipeline};
use prodcat_core::{CatalogConfig, CatalogPaths, Error, FindingType, Language, Product};
use prodcat_llm::{ModelConfig, ProviderError, ScriptedModelClient, StopReason};
use prodcat_vectors::InMemoryEmbeddingStore;

struct Fixture {
    _dir: TempDir,
    pipeline: Pipeline,
    client: Arc<ScriptedModelClient>,
    schema_store: Arc<InMemoryObjectStore>,
}

fn write(dir: &Path, name: &str, value: serde_json::Value) {
    std::fs::write(dir.join(name), serde_json::to_vec_pretty(&value).unwrap()).unwrap();
}

fn leaf(id: &str, name: &str, parent_id: &str, parent_name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "full_path": [
            {"id": parent_id, "name": parent_name},
            {"id": id, "name": name}
        ],
        "childs": []
    })
}

fn fixture(demo: bool) -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(
        root,
        "category_tree.json",
        json!({
            "60000000": {
                "id": "60000000",
                "name": "Media",
                "full_path": [{"id": "60000000", "name": "Media"}],
                "childs": [{"id": "60010200", "name": "Books"}]
            },
            "60010200": leaf("60010200", "Books", "60000000", "Media"),
            "70010100": leaf("70010100", "Shoes", "70000000", "Footwear"),
            "99990000": leaf("99990000", "Other", "99000000", "Miscellaneous")
        }),
    );
    write(
        root,
        "word_map.json",
        json!({
            "book": ["60010200"],
            "shoe": ["70010100"],
            "other": ["99990000"]
        }),
    );
    write(
        root,
        "category_vectors.json",
        json!({
            "book": [1.0, 0.0, 0.0],
            "shoe": [0.0, 1.0, 0.0],
            "other": [0.0, 0.0, 1.0]
        }),
    );
    write(root, "always_categories.json", json!(["60010200"]));
    write(root, "brands.json", json!(["Acme"]));
    write(root, "descriptors.json", json!(["pack"]));
    write(root, "synonyms.json", json!({"sneaker": "shoe"}));

    let catalog_config = CatalogConfig {
        paths: CatalogPaths::new(root),
        embedding_dim: 3,
        language: Language::English,
        demo,
        schema_ttl_secs: 300,
    };

    let mut model_config = ModelConfig::default();
    model_config.retry_min_secs = 0;
    model_config.retry_max_secs = 0;
    model_config.retry_multiplier = 0.0;

    let mut embeddings = HashMap::new();
    embeddings.insert("running".to_string(), vec![0.1, 0.9, 0.0]);
    embeddings.insert("novel".to_string(), vec![0.95, 0.05, 0.0]);
    let embeddings = Arc::new(InMemoryEmbeddingStore::new(embeddings));

    let schema_store = Arc::new(InMemoryObjectStore::new());
    schema_store.put(
        "attributes_schema.json",
        serde_json::to_vec(&json!({
            "70010100": {
                "category_name": "Footwear",
                "subcategory_name": "Shoes",
                "attributes_schema": {"colour": "Main colour", "size": "EU size"}
            },
            "60010200": {
                "category_name": "Media",
                "subcategory_name": "Books",
                "attributes_schema": null
            }
        }))
        .unwrap(),
    );

    let client = Arc::new(ScriptedModelClient::new());
    let pipeline = Pipeline::build(
        &catalog_config,
        &model_config,
        embeddings,
        schema_store.clone(),
        client.clone(),
    )
    .unwrap();

    Fixture {
        _dir: dir,
        pipeline,
        client,
        schema_store,
    }
}

fn prediction(id: &str, name: &str) -> String {
    format!(
        "The product is footwear.</thinking>\n<prediction>\n\
         <predicted_category_id>{}</predicted_category_id>\n\
         <predicted_category_name>{}</predicted_category_name>\n\
         <explanation>Running shoes are shoes.</explanation>\n</prediction>\n",
        id, name
    )
}

fn shoes() -> Product {
    Product::new("Acme Red Running Shoes 10x5 pack x2", "")
}

#[test]
fn test_cleaned_title_drops_brand_dimensions_and_pack() {
    let fx = fixture(true);
    let pred = fx.pipeline.metaclass().classify(&shoes()).unwrap();

    let clean_title = pred.clean_title.unwrap();
    assert!(clean_title.contains("running shoe"), "{}", clean_title);
    for gone in ["acme", "10x5", "pack", "x2"] {
        assert!(!clean_title.contains(gone), "{} still in {}", gone, clean_title);
    }
}

#[test]
fn test_exact_match_precedence() {
    let fx = fixture(true);
    let pred = fx.pipeline.metaclass().classify(&shoes()).unwrap();
    let findings = pred.findings.unwrap();

    let exact: Vec<_> = findings
        .iter()
        .filter(|f| f.kind == FindingType::ExactMatch)
        .collect();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].word, "shoe");
    assert_eq!(exact[0].score, 1.0);
    assert_eq!(findings[0], *exact[0]);

    assert!(findings
        .iter()
        .filter(|f| f.kind == FindingType::WordEmb)
        .all(|f| f.position != exact[0].position));
    assert_eq!(pred.possible_categories, vec!["70010100".to_string()]);
}

#[test]
fn test_fallback_to_other() {
    let fx = fixture(true);
    let pred = fx
        .pipeline
        .metaclass()
        .classify(&Product::new("Quantum Flux Capacitor", ""))
        .unwrap();

    let findings = pred.findings.unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, FindingType::Other);
    assert_eq!(findings[0].word, "other");
    assert_eq!(findings[0].score, 0.4);
    assert_eq!(pred.possible_categories, vec!["99990000".to_string()]);
}

#[test]
fn test_candidate_listed_once() {
    let fx = fixture(false);
    fx.client
        .push_text(prediction("60010200", "Books"), StopReason::StopSequence);

    let pred = fx
        .pipeline
        .classifier()
        .classify(
            &Product::new("War and Peace", "A novel"),
            &["60010200".to_string()],
            true,
            false,
        )
        .unwrap();

    let prompt = pred.prompt.unwrap();
    assert_eq!(prompt.matches("<id>60010200</id>").count(), 1);
    assert_eq!(pred.predicted_category_name, "Media > Books");
}

#[test]
fn test_hallucination_bound() {
    let fx = fixture(false);
    for _ in 0..3 {
        fx.client
            .push_text(prediction("12345678", "Shoes"), StopReason::StopSequence);
    }

    let err = fx
        .pipeline
        .classifier()
        .classify(&shoes(), &["70010100".to_string()], false, false)
        .unwrap_err();

    assert!(matches!(err, Error::ModelResponse(_)));
    assert_eq!(err.to_string(), "Hallucination detected");
    assert!(!err.is_retryable());
    assert_eq!(fx.client.invocations(), 2);
    assert_eq!(fx.client.remaining(), 1);
}

#[test]
fn test_correction_round_replays_conversation() {
    let fx = fixture(false);
    fx.client
        .push_text(prediction("70010100", "Boots"), StopReason::StopSequence)
        .push_text(prediction("70010100", "Shoes"), StopReason::StopSequence);

    let pred = fx
        .pipeline
        .classifier()
        .classify(&shoes(), &["70010100".to_string()], false, false)
        .unwrap();
    assert_eq!(pred.predicted_category_id, "70010100");
    assert_eq!(pred.predicted_category_name, "Footwear > Shoes");

    let requests = fx.client.requests();
    assert_eq!(requests.len(), 2);
    let retry = &requests[1].messages;
    assert_eq!(retry.len(), 4);
    assert_eq!(retry[0].content, requests[0].messages[0].content);
    assert!(retry[1].content.starts_with("<response>\n<thinking>The product is footwear."));
    assert!(retry[1].content.ends_with("</response>"));
    assert!(retry[2].content.starts_with("The predicted_category_id does not exist"));
    assert_eq!(retry[3].content, "<response>\n<thinking>");
}

#[test]
fn test_throttling_is_retried_below_the_classifier() {
    let fx = fixture(false);
    fx.client
        .push_error(ProviderError::throttling("Too many requests"))
        .push_text(prediction("70010100", "Shoes"), StopReason::StopSequence);

    let pred = fx
        .pipeline
        .classifier()
        .classify(&shoes(), &["70010100".to_string()], false, false)
        .unwrap();
    assert_eq!(pred.predicted_category_id, "70010100");
    assert_eq!(fx.client.invocations(), 2);
}

#[test]
fn test_schema_without_attributes_skips_model() {
    let fx = fixture(false);
    let attrs = fx
        .pipeline
        .extractor()
        .extract_attributes(&Product::new("War and Peace", "A novel"), "60010200")
        .unwrap();
    assert!(attrs.is_empty());
    assert_eq!(fx.client.invocations(), 0);
}

#[test]
fn test_schema_document_cached_across_lookups() {
    let fx = fixture(false);
    let extractor = fx.pipeline.extractor();
    let book = Product::new("War and Peace", "A novel");

    extractor.extract_attributes(&book, "60010200").unwrap();
    extractor.extract_attributes(&book, "60010200").unwrap();
    extractor.extract_attributes(&book, "404").unwrap();
    assert_eq!(fx.schema_store.fetches(), 1);
}

#[test]
fn test_full_run() {
    let fx = fixture(false);
    fx.client
        .push_text(prediction("70010100", "Shoes"), StopReason::StopSequence)
        .push_text(
            "red and 42</scratchpad><attributes>\
             <attribute><name>Colour</name><value>Red</value></attribute>\
             </attributes>",
            StopReason::StopSequence,
        );

    let output = fx.pipeline.run(&shoes(), false).unwrap();

    assert_eq!(output.metaclass.possible_categories, vec!["70010100".to_string()]);
    assert!(output.metaclass.findings.is_none());
    assert!(output.metaclass.clean_title.is_none());
    assert_eq!(output.categorization.predicted_category_name, "Footwear > Shoes");
    assert!(output.categorization.prompt.is_none());
    assert_eq!(output.attributes.len(), 1);
    assert_eq!(fx.client.invocations(), 2);

    let value = serde_json::to_value(&output).unwrap();
    assert_eq!(value["attributes"]["attributes"][0]["value"], "Red");
}

#[test]
fn test_dryrun_makes_no_model_calls() {
    let fx = fixture(true);
    let output = fx.pipeline.run(&shoes(), true).unwrap();

    assert_eq!(output.categorization.predicted_category_id, "1234");
    assert_eq!(output.categorization.predicted_category_name, "Test");
    assert!(output.categorization.prompt.is_some());
    assert!(output.metaclass.findings.is_some());
    assert!(output.attributes.is_empty());
    assert_eq!(fx.client.invocations(), 0);
}
