use super::{Completion, CompletionRequest, LlmClient};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client with an injectable base URL
pub struct ClaudeClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

impl ClaudeClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            endpoint: messages_endpoint(base_url),
            timeout,
        })
    }

    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| ProviderError::InvalidHeader(format!("x-api-key: {}", e)))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl LlmClient for ClaudeClient {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            temperature: Some(request.temperature),
            messages: vec![WireMessage {
                role: "user",
                content: &request.prompt,
            }],
        };

        debug!(model = %request.model, stage = %request.stage, "Claude messages request");
        let start = std::time::Instant::now();

        let response = self
            .http
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::from(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status,
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed.text().ok_or(ProviderError::EmptyResponse)?;

        Ok(Completion {
            text,
            duration: start.elapsed(),
        })
    }
}

/// `https://host` -> `https://host/v1/messages`; a base already ending in `/v1` is kept
fn messages_endpoint(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{}/messages", base)
    } else {
        format!("{}/v1/messages", base)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    /// Concatenated text blocks, `None` when there is no text at all
    fn text(&self) -> Option<String> {
        let text: String = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
