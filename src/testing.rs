//! Deterministic stand-ins for the LLM and the content platform

use crate::error::{FetchError, ProviderError, Stage};
use crate::provider::{Completion, CompletionRequest, LlmClient};
use crate::reddit::{ContentSource, Page, PageQuery};
use crate::types::ContentItem;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Handler = Box<dyn Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync>;

/// LLM fake answering every request through a closure
pub struct ScriptedLlm {
    handler: Handler,
    requests: Mutex<Vec<CompletionRequest>>,
    delays: Vec<(Stage, Duration)>,
}

impl ScriptedLlm {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            delays: Vec::new(),
        }
    }

    /// Sleep before answering requests of one stage
    pub fn with_delay_for(mut self, stage: Stage, delay: Duration) -> Self {
        self.delays.push((stage, delay));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_for(&self, stage: Stage) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stage == stage)
            .count()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some((_, delay)) = self.delays.iter().find(|(s, _)| *s == request.stage) {
            tokio::time::sleep(*delay).await;
        }
        (self.handler)(request).map(|text| Completion {
            text,
            duration: Duration::ZERO,
        })
    }
}

type FailureFn = Box<dyn Fn(usize) -> Option<FetchError> + Send + Sync>;

/// Content source serving a fixed pool of items, page by page.
///
/// By default every call takes the next `limit` unseen items from the pool
/// regardless of the query, so concurrent queries receive disjoint slices.
/// A [`FakeSource::listing`] instead pages each query through the same pool
/// from its own `after` cursor, so queries overlap the way related searches do.
pub struct FakeSource {
    pool: Vec<ContentItem>,
    cursor: Mutex<usize>,
    overlapping: bool,
    calls: AtomicUsize,
    failure: Option<FailureFn>,
    delay: Duration,
}

impl FakeSource {
    pub fn with_items(pool: Vec<ContentItem>) -> Self {
        Self {
            pool,
            cursor: Mutex::new(0),
            overlapping: false,
            calls: AtomicUsize::new(0),
            failure: None,
            delay: Duration::ZERO,
        }
    }

    /// Every query sees the whole pool, starting from its own cursor
    pub fn listing(pool: Vec<ContentItem>) -> Self {
        Self {
            overlapping: true,
            ..Self::with_items(pool)
        }
    }

    /// Fail the n-th call (0-based) with the error the closure returns
    pub fn failing_when<F>(mut self, failure: F) -> Self
    where
        F: Fn(usize) -> Option<FetchError> + Send + Sync + 'static,
    {
        self.failure = Some(Box::new(failure));
        self
    }

    /// Sleep before answering each page
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Page, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = self.failure.as_ref().and_then(|f| f(call)) {
            return Err(err);
        }

        let limit = query.limit as usize;
        let (start, end) = if self.overlapping {
            let start = query
                .after
                .as_deref()
                .and_then(|after| after.strip_prefix("t3_"))
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(0)
                .min(self.pool.len());
            (start, (start + limit).min(self.pool.len()))
        } else {
            let mut cursor = self.cursor.lock().unwrap();
            let start = *cursor;
            *cursor = (start + limit).min(self.pool.len());
            (start, *cursor)
        };

        Ok(Page {
            items: self.pool[start..end].to_vec(),
            after: (end < self.pool.len()).then(|| format!("t3_{}", end)),
        })
    }
}

/// Item ids listed in a labeling prompt, in prompt order
pub fn item_ids_in_prompt(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .filter_map(|line| line.strip_prefix("### ["))
        .filter_map(|rest| rest.split_once(']').map(|(id, _)| id.to_string()))
        .collect()
}

/// Labeling answer assigning each id the tasks `assign` returns
pub fn labels_json<F>(ids: &[String], assign: F) -> String
where
    F: Fn(&str) -> Vec<String>,
{
    let labels: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            serde_json::json!({
                "id": id,
                "tasks": assign(id),
                "rationale": format!("mentions {}", id),
            })
        })
        .collect();
    serde_json::json!({ "labels": labels }).to_string()
}
