//! Prodcat LLM: the boundary to the language model.
//!
//! - `client`: provider trait and the Anthropic Messages API client
//! - `invoke`: rate-limit retry and stop-reason framing shared by every stage
//! - `parsing`: best-effort JSON extraction and tolerant XML parsing
//! - `scripted`: replayable client for tests and offline runs

pub mod client;
pub mod config;
pub mod invoke;
pub mod parsing;
pub mod scripted;
pub mod types;

pub use client::{AnthropicClient, ModelClient, ProviderError, ProviderErrorKind};
pub use config::ModelConfig;
pub use invoke::{ModelInvoker, ResponseFrame, RetryPolicy};
pub use parsing::{find_json, json_to_xml, parse_response};
pub use scripted::ScriptedModelClient;
pub use types::*;
