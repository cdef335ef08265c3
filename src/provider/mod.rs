mod claude;

pub use claude::ClaudeClient;

use crate::config::RetryConfig;
use crate::error::{ProviderError, Stage};
use crate::pipeline::retry_with_backoff;
use async_trait::async_trait;
use std::time::Duration;

/// A single prompt/completion exchange
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Stage issuing the call, for logging and test fakes
    pub stage: Stage,
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub duration: Duration,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}

/// Complete with the shared retry policy applied to transient provider errors
pub async fn complete_with_retry(
    llm: &dyn LlmClient,
    request: &CompletionRequest,
    retry: &RetryConfig,
) -> Result<Completion, ProviderError> {
    retry_with_backoff(retry, || llm.complete(request)).await
}
