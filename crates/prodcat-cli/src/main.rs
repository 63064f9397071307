//! prodcat: run the categorization stages on a product JSON file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use prodcat_classify::{FsObjectStore, Pipeline};
use prodcat_core::{CatalogConfig, Product};
use prodcat_llm::{AnthropicClient, ModelClient, ModelConfig, ScriptedModelClient};
use prodcat_vectors::SqliteEmbeddingStore;

const USAGE: &str = "Usage: prodcat <command> [args] [--dryrun]

Commands:
  metaclass <product.json>                 Candidate categories from the title
  categorize <product.json>                Metaclass, then model categorization
  attributes <product.json> <category-id>  Attribute extraction for a category
  run <product.json>                       All three stages
  import-embeddings <vectors.json>         Load word vectors into the embedding store
  help                                     Show this help message

Environment:
  PRODCAT_CONFIG_DIR   catalog directory (default: config)
  ANTHROPIC_API_KEY    model provider key
  RUST_LOG             log filter (default: info)";

fn resolve_config_dir() -> PathBuf {
    std::env::var("PRODCAT_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"))
}

fn read_product(path: &str) -> anyhow::Result<Product> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse product in {}", path))
}

/// The provider client, or the offline stand-in when no call will reach the
/// provider. A missing key outside offline runs is an error.
fn model_client(config: &ModelConfig, offline: bool) -> anyhow::Result<Arc<dyn ModelClient>> {
    match config.api_key.as_deref() {
        Some(key) => {
            let mut client = AnthropicClient::new(key, config.timeout())?;
            if let Some(url) = config.base_url.as_deref() {
                client = client.with_base_url(url);
            }
            Ok(Arc::new(client))
        }
        None if offline => {
            info!("ANTHROPIC_API_KEY not set, running without a model provider");
            Ok(Arc::new(ScriptedModelClient::new()))
        }
        None => anyhow::bail!(
            "ANTHROPIC_API_KEY is not set; pass --dryrun to run without a model provider"
        ),
    }
}

/// `metaclass_only` runs need no model unless title normalization is configured.
fn build_pipeline(config_dir: &Path, dryrun: bool, metaclass_only: bool) -> anyhow::Result<Pipeline> {
    let catalog_config = CatalogConfig::from_env(config_dir)?;
    let mut model_config = ModelConfig::load(&config_dir.join("model-config.json"));

    let offline = model_config.api_key.is_none()
        && (dryrun || (metaclass_only && model_config.normalization_model.is_none()));
    if offline && model_config.normalization_model.take().is_some() {
        warn!("Title normalization disabled without a model provider");
    }

    let embeddings = SqliteEmbeddingStore::open(config_dir, catalog_config.embedding_dim)
        .map_err(|e| anyhow::anyhow!("Failed to open embedding store: {}", e))?;
    let schema_store = FsObjectStore::new(config_dir);
    let client = model_client(&model_config, offline)?;

    Ok(Pipeline::build(
        &catalog_config,
        &model_config,
        Arc::new(embeddings),
        Arc::new(schema_store),
        client,
    )?)
}

fn import_embeddings(config_dir: &Path, path: &str) -> anyhow::Result<()> {
    let catalog_config = CatalogConfig::from_env(config_dir)?;
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let vectors: HashMap<String, Vec<f32>> = serde_json::from_str(&text)?;

    let store = SqliteEmbeddingStore::open(config_dir, catalog_config.embedding_dim)?;
    let written = store.put_many(vectors.iter().map(|(w, v)| (w.as_str(), v.as_slice())))?;
    info!("Imported {} word vectors, store now holds {}", written, store.count()?);
    Ok(())
}

fn arg(args: &[String], i: usize) -> &str {
    args.get(i).map(String::as_str).unwrap_or_else(|| {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().collect();
    let dryrun = args.iter().any(|a| a == "--dryrun");
    args.retain(|a| a != "--dryrun");

    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let config_dir = resolve_config_dir();
    info!("Config directory: {}", config_dir.display());

    match args[1].as_str() {
        "metaclass" => {
            let product = read_product(arg(&args, 2))?;
            let pipeline = build_pipeline(&config_dir, dryrun, true)?;
            print_json(&pipeline.metaclass().classify(&product)?)
        }
        "categorize" => {
            let product = read_product(arg(&args, 2))?;
            let pipeline = build_pipeline(&config_dir, dryrun, false)?;
            let metaclass = pipeline.metaclass().classify(&product)?;
            let prediction = pipeline.classifier().classify(
                &product,
                &metaclass.possible_categories,
                false,
                dryrun,
            )?;
            print_json(&prediction)
        }
        "attributes" => {
            let product = read_product(arg(&args, 2))?;
            let category_id = arg(&args, 3);
            let pipeline = build_pipeline(&config_dir, false, false)?;
            print_json(&pipeline.extractor().extract_attributes(&product, category_id)?)
        }
        "run" => {
            let product = read_product(arg(&args, 2))?;
            let pipeline = build_pipeline(&config_dir, dryrun, false)?;
            print_json(&pipeline.run(&product, dryrun)?)
        }
        "import-embeddings" => import_embeddings(&config_dir, arg(&args, 2)),
        "--help" | "-h" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}. Use 'prodcat help' for usage.", other);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_an_error_for_live_runs() {
        let config = ModelConfig::default();
        let err = model_client(&config, false).err().unwrap();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_missing_key_allowed_offline() {
        let config = ModelConfig::default();
        assert!(model_client(&config, true).is_ok());
    }
}
