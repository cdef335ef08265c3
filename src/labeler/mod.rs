//! Classify fetched items against the run's sub-tasks
//!
//! Items are labeled in fixed-size batches, run concurrently under the
//! configured bound. A batch that still fails after retries marks its own
//! items as failed; other batches are unaffected. Every input item yields
//! exactly one [`LabeledItem`].

use crate::config::Config;
use crate::error::{LabelingError, Stage};
use crate::parser::parse_embedded;
use crate::pipeline::retry_with_backoff;
use crate::provider::{CompletionRequest, LlmClient};
use crate::types::{ContentItem, LabelStatus, LabeledItem, SubTask};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

const LABEL_PROMPT: &str = include_str!("../../prompts/label.md");

const SYSTEM: &str = "You are labeling Reddit posts for a research study.";

const NOT_RETURNED: &str = "not returned by model";

#[derive(Debug, Deserialize)]
struct RawLabel {
    id: String,
    #[serde(default, alias = "labels", alias = "subtasks", alias = "task_ids")]
    tasks: Vec<String>,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    quote: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelShape {
    Wrapped {
        #[serde(alias = "items", alias = "results")]
        labels: Vec<RawLabel>,
    },
    Bare(Vec<RawLabel>),
}

pub async fn label(
    llm: &dyn LlmClient,
    config: &Config,
    question: &str,
    subtasks: &[SubTask],
    items: Vec<ContentItem>,
    model: &str,
) -> Vec<LabeledItem> {
    let batch_size = config.label_batch_size.max(1);
    let batches: Vec<Vec<ContentItem>> = items
        .chunks(batch_size)
        .map(|chunk| chunk.to_vec())
        .collect();

    info!(
        "Labeling {} items in {} batches against {} sub-tasks",
        items.len(),
        batches.len(),
        subtasks.len()
    );

    let known: HashSet<&str> = subtasks.iter().map(|t| t.id.as_str()).collect();
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let mut futures = FuturesUnordered::new();

    for (index, batch) in batches.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let request = CompletionRequest {
            stage: Stage::Label,
            model: model.to_string(),
            system: Some(SYSTEM.to_string()),
            prompt: render_prompt(question, subtasks, &batch, config.llm.snippet_chars),
            max_tokens: config.llm.label_max_tokens,
            temperature: config.llm.temperature,
        };
        futures.push(async move {
            let _permit = semaphore.acquire_owned().await;
            let result =
                retry_with_backoff(&config.retry, || label_batch_once(llm, &request)).await;
            (index, batch, result)
        });
    }

    let mut labeled = Vec::with_capacity(items.len());
    while let Some((index, batch, result)) = futures.next().await {
        match result {
            Ok(raw) => {
                debug!("Batch {} returned {} labels", index, raw.len());
                labeled.extend(assemble(batch, raw, &known));
            }
            Err(e) => {
                warn!("Batch {} failed, marking {} items: {}", index, batch.len(), e);
                let error = e.to_string();
                labeled.extend(
                    batch
                        .into_iter()
                        .map(|item| LabeledItem::failed(item, error.clone())),
                );
            }
        }
    }

    labeled.sort_by(|a, b| a.item.id.cmp(&b.item.id));

    let matched = labeled
        .iter()
        .filter(|l| l.status == LabelStatus::Labeled)
        .count();
    info!("Labeled {} of {} items", matched, labeled.len());
    labeled
}

async fn label_batch_once(
    llm: &dyn LlmClient,
    request: &CompletionRequest,
) -> Result<Vec<RawLabel>, LabelingError> {
    let completion = llm.complete(request).await?;
    parse_labels(&completion.text)
}

fn parse_labels(raw: &str) -> Result<Vec<RawLabel>, LabelingError> {
    match parse_embedded::<LabelShape>(raw) {
        Some(LabelShape::Wrapped { labels }) | Some(LabelShape::Bare(labels)) => Ok(labels),
        None => {
            let preview: String = raw.trim().chars().take(120).collect();
            Err(LabelingError::ParseOutput(preview))
        }
    }
}

/// Match model answers back to the batch. Unknown task ids are dropped and
/// quotes that do not occur in the item text are discarded.
fn assemble(
    batch: Vec<ContentItem>,
    raw: Vec<RawLabel>,
    known: &HashSet<&str>,
) -> Vec<LabeledItem> {
    let mut by_id: HashMap<String, RawLabel> = HashMap::new();
    for label in raw {
        by_id.entry(label.id.trim().to_string()).or_insert(label);
    }

    batch
        .into_iter()
        .map(|item| {
            let Some(answer) = by_id.remove(&item.id) else {
                return LabeledItem::unmatched(item, NOT_RETURNED);
            };

            let labels: BTreeSet<String> = answer
                .tasks
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| {
                    let ok = known.contains(t.as_str());
                    if !ok {
                        debug!("Dropping unknown sub-task '{}' for item {}", t, item.id);
                    }
                    ok
                })
                .collect();

            if labels.is_empty() {
                let rationale = if answer.rationale.trim().is_empty() {
                    "no matching sub-task".to_string()
                } else {
                    answer.rationale.trim().to_string()
                };
                return LabeledItem::unmatched(item, rationale);
            }

            let text = item.text();
            let quote = answer
                .quote
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty() && text.contains(q.as_str()));

            LabeledItem {
                item,
                labels,
                rationale: answer.rationale.trim().to_string(),
                quote,
                status: LabelStatus::Labeled,
            }
        })
        .collect()
}

fn render_prompt(
    question: &str,
    subtasks: &[SubTask],
    batch: &[ContentItem],
    snippet_chars: usize,
) -> String {
    let tasks: String = subtasks
        .iter()
        .map(|t| format!("- {} ({}): {}\n", t.id, t.title, t.description))
        .collect();

    let mut posts = String::new();
    for item in batch {
        posts.push_str(&format!(
            "### [{}] score {}\n{}\n\n",
            item.id,
            item.metadata.score,
            item.snippet(snippet_chars)
        ));
    }

    LABEL_PROMPT
        .replace("{{QUESTION}}", question.trim())
        .replace("{{SUBTASKS}}", tasks.trim_end())
        .replace("{{ITEMS}}", posts.trim_end())
}
