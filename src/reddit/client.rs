use super::throttle::Throttle;
use super::types::{Listing, TokenResponse};
use super::{ContentSource, Page, PageQuery};
use crate::config::RedditConfig;
use crate::credentials::Credentials;
use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Refresh the token this long before it actually expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct RedditClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    auth_url: String,
    api_base_url: String,
    timeout: Duration,
    throttle: Arc<Throttle>,
    token: Mutex<Option<CachedToken>>,
}

impl RedditClient {
    pub fn new(
        credentials: &Credentials,
        config: &RedditConfig,
        timeout: Duration,
        throttle: Arc<Throttle>,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(credentials.reddit_user_agent.clone())
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http,
            client_id: credentials.reddit_client_id.clone(),
            client_secret: credentials.reddit_client_secret.clone(),
            auth_url: config.auth_url.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            timeout,
            throttle,
            token: Mutex::new(None),
        })
    }

    fn transport(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::from(err)
        }
    }

    async fn bearer(&self) -> Result<String, FetchError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        self.throttle.acquire().await;
        debug!("Requesting application-only access token");

        let response = self
            .http
            .post(&self.auth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body, retry_after));
        }

        // Bad credentials can come back as 200 with an `error` field
        let value: serde_json::Value = response.json().await.map_err(|e| self.transport(e))?;
        if let Some(error) = value.get("error") {
            return Err(FetchError::Auth {
                status: status.as_u16(),
                message: error.to_string(),
            });
        }
        let token: TokenResponse =
            serde_json::from_value(value).map_err(|e| FetchError::Parse(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

#[async_trait]
impl ContentSource for RedditClient {
    fn name(&self) -> &'static str {
        "reddit"
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Page, FetchError> {
        let token = self.bearer().await?;
        self.throttle.acquire().await;

        let url = format!("{}/r/{}/search", self.api_base_url, query.subreddit);
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.query.clone()),
            ("sort", query.sort.to_string()),
            ("t", query.time_filter.to_string()),
            ("limit", query.limit.min(100).to_string()),
            ("raw_json", "1".to_string()),
            ("type", "link".to_string()),
        ];
        if !query.subreddit.eq_ignore_ascii_case("all") {
            params.push(("restrict_sr", "1".to_string()));
        }
        if let Some(after) = &query.after {
            params.push(("after", after.clone()));
        }

        debug!(
            subreddit = %query.subreddit,
            query = %query.query,
            after = ?query.after,
            "Fetching search page"
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .query(&params)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                // Force a fresh token on the next call
                *self.token.lock().await = None;
            }
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body, retry_after));
        }

        let listing: Listing = response.json().await.map_err(|e| self.transport(e))?;
        let (items, after) = listing.into_items();
        Ok(Page { items, after })
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

fn classify_status(status: StatusCode, body: String, retry_after: Option<Duration>) -> FetchError {
    let message: String = body.chars().take(500).collect();
    match status.as_u16() {
        401 | 403 => FetchError::Auth {
            status: status.as_u16(),
            message,
        },
        429 => FetchError::RateLimited { retry_after },
        code => FetchError::Upstream {
            status: code,
            message,
        },
    }
}
