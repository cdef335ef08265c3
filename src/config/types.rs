use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Upper bound on concurrent upstream calls within one stage
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_label_batch_size")]
    pub label_batch_size: usize,

    /// Per-call timeout for platform and LLM requests
    #[serde(default = "default_request_timeout_sec")]
    pub request_timeout_sec: u64,

    /// Budget for a whole pipeline run
    #[serde(default = "default_run_timeout_sec")]
    pub run_timeout_sec: u64,

    #[serde(default = "default_secrets_file")]
    pub secrets_file: PathBuf,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub reddit: RedditConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RedditConfig {
    #[serde(default = "default_reddit_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_reddit_api_base_url")]
    pub api_base_url: String,

    /// Items requested per listing page (upstream caps this at 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            auth_url: default_reddit_auth_url(),
            api_base_url: default_reddit_api_base_url(),
            page_size: default_page_size(),
            min_request_interval_ms: default_min_request_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct LlmConfig {
    /// Used when neither the request nor CLAUDE_MODEL names a model
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_decompose_max_tokens")]
    pub decompose_max_tokens: u32,

    #[serde(default = "default_label_max_tokens")]
    pub label_max_tokens: u32,

    #[serde(default = "default_synthesize_max_tokens")]
    pub synthesize_max_tokens: u32,

    /// Characters of item text passed to the model per item
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            temperature: default_temperature(),
            decompose_max_tokens: default_decompose_max_tokens(),
            label_max_tokens: default_label_max_tokens(),
            synthesize_max_tokens: default_synthesize_max_tokens(),
            snippet_chars: default_snippet_chars(),
        }
    }
}
