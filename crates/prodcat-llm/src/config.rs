//! Model configuration (persisted to a JSON file, env fallback for the key).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::invoke::RetryPolicy;

pub const DEFAULT_CATEGORIZATION_MODEL: &str = "claude-3-haiku-20240307";
pub const DEFAULT_NORMALIZATION_MODEL: &str = "claude-3-haiku-20240307";
pub const DEFAULT_EXTRACTION_MODEL: &str = "claude-3-5-sonnet-20240620";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_categorization_model")]
    pub categorization_model: String,
    /// Title normalization before metaclass lookup. `None` cleans titles offline.
    #[serde(default)]
    pub normalization_model: Option<String>,
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_min_secs")]
    pub retry_min_secs: u64,
    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: u64,
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,
}

fn default_categorization_model() -> String {
    DEFAULT_CATEGORIZATION_MODEL.into()
}
fn default_extraction_model() -> String {
    DEFAULT_EXTRACTION_MODEL.into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_min_secs() -> u64 {
    30
}
fn default_retry_max_secs() -> u64 {
    60
}
fn default_retry_multiplier() -> f64 {
    2.0
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            categorization_model: default_categorization_model(),
            normalization_model: None,
            extraction_model: default_extraction_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_min_secs: default_retry_min_secs(),
            retry_max_secs: default_retry_max_secs(),
            retry_multiplier: default_retry_multiplier(),
        }
    }
}

impl ModelConfig {
    /// Load from `path`, falling back to defaults; `ANTHROPIC_API_KEY` and
    /// `PRODCAT_NORMALIZATION_MODEL` fill fields the file leaves unset.
    pub fn load(path: &Path) -> Self {
        let mut config: ModelConfig = match std::fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                warn!("Ignoring malformed model config {}: {}", path.display(), e);
                ModelConfig::default()
            }),
            Err(_) => ModelConfig::default(),
        };

        if config.api_key.is_none() {
            config.api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        }
        if config.normalization_model.is_none() {
            config.normalization_model = std::env::var("PRODCAT_NORMALIZATION_MODEL").ok();
        }

        info!(
            "Model config: categorization={}, extraction={}, normalization={}",
            config.categorization_model,
            config.extraction_model,
            config.normalization_model.as_deref().unwrap_or("offline")
        );
        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            min_wait: Duration::from_secs(self.retry_min_secs),
            max_wait: Duration::from_secs(self.retry_max_secs),
            multiplier: self.retry_multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model-config.json");
        std::fs::write(
            &path,
            r#"{"api_key": "sk-test", "categorization_model": "claude-3-5-haiku-20241022"}"#,
        )
        .unwrap();

        let config = ModelConfig::load(&path);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.categorization_model, "claude-3-5-haiku-20241022");
        assert_eq!(config.extraction_model, DEFAULT_EXTRACTION_MODEL);
        assert_eq!(config.timeout(), Duration::from_secs(120));

        let retry = config.retry_policy();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.min_wait, Duration::from_secs(30));
        assert_eq!(retry.max_wait, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ModelConfig::load(&dir.path().join("absent.json"));
        assert_eq!(config.categorization_model, DEFAULT_CATEGORIZATION_MODEL);
        assert_eq!(config.max_tokens, 4096);
    }
}
