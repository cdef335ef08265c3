//! Split a research question into a fixed number of sub-tasks
//!
//! The model is asked for exactly `task_count` angles. Its answer is parsed
//! tolerantly (JSON first, then a markdown list), repaired once with a
//! stricter instruction if nothing parses, and finally normalized: duplicates
//! dropped, extra angles truncated (model order kept), missing angles padded
//! with generic research angles on the original question.

use crate::config::Config;
use crate::error::{DecompositionError, Stage};
use crate::parser::{parse_embedded, parse_list_items};
use crate::provider::{complete_with_retry, CompletionRequest, LlmClient};
use crate::types::SubTask;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

const DECOMPOSE_PROMPT: &str = include_str!("../../prompts/decompose.md");
const REPAIR_PROMPT: &str = include_str!("../../prompts/decompose_repair.md");

const SYSTEM: &str = "You are a research assistant planning a study of Reddit discussions.";

/// Fallback angles, applied in order, when the model returns too few
const GENERIC_ANGLES: [(&str, &str); 8] = [
    ("Overall experiences", "overall experiences and sentiment"),
    ("Pain points", "common complaints, frustrations and concerns"),
    ("Decision factors", "what people weigh most before deciding"),
    ("Alternatives", "comparisons with alternatives and competitors"),
    ("Recommendations", "advice and recommendations people give each other"),
    ("Cost and value", "price, running cost and perceived value"),
    ("Positive outcomes", "what people praise or enjoy"),
    ("Open questions", "unanswered questions and sources of uncertainty"),
];

const STOPWORDS: [&str; 32] = [
    "a", "an", "and", "are", "before", "by", "do", "does", "for", "from", "how", "i", "in",
    "is", "it", "most", "of", "on", "or", "people", "the", "their", "they", "to", "what",
    "when", "which", "who", "why", "with", "want", "about",
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    title: String,
    description: String,
    search_query: String,
}

pub async fn decompose(
    llm: &dyn LlmClient,
    config: &Config,
    question: &str,
    task_count: usize,
    model: &str,
) -> Result<Vec<SubTask>, DecompositionError> {
    info!("Decomposing question into {} sub-tasks", task_count);

    let prompt = DECOMPOSE_PROMPT
        .replace("{{TASK_COUNT}}", &task_count.to_string())
        .replace("{{QUESTION}}", question);
    let request = completion_request(config, model, prompt);
    let output = complete_with_retry(llm, &request, &config.retry).await?;

    let mut candidates = parse_candidates(&output.text);
    if candidates.is_empty() {
        warn!("Decomposition output unparseable, retrying with stricter instruction");
        let repair = REPAIR_PROMPT
            .replace("{{TASK_COUNT}}", &task_count.to_string())
            .replace("{{QUESTION}}", question)
            .replace("{{PREVIOUS}}", output.text.trim());
        let request = completion_request(config, model, repair);
        let output = complete_with_retry(llm, &request, &config.retry).await?;
        candidates = parse_candidates(&output.text);
    }

    if candidates.is_empty() {
        return Err(DecompositionError::Unparseable);
    }

    debug!("Model proposed {} angles", candidates.len());
    Ok(normalize(question, candidates, task_count))
}

fn completion_request(config: &Config, model: &str, prompt: String) -> CompletionRequest {
    CompletionRequest {
        stage: Stage::Decompose,
        model: model.to_string(),
        system: Some(SYSTEM.to_string()),
        prompt,
        max_tokens: config.llm.decompose_max_tokens,
        temperature: config.llm.temperature,
    }
}

fn parse_candidates(raw: &str) -> Vec<Candidate> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        Wrapped {
            #[serde(alias = "angles", alias = "subtasks", alias = "sub_tasks")]
            tasks: Vec<serde_json::Value>,
        },
        Bare(Vec<serde_json::Value>),
    }

    if let Some(shape) = parse_embedded::<Shape>(raw) {
        let values = match shape {
            Shape::Wrapped { tasks } => tasks,
            Shape::Bare(values) => values,
        };
        let candidates: Vec<Candidate> = values.iter().filter_map(candidate_from_value).collect();
        if !candidates.is_empty() {
            return candidates;
        }
    }

    parse_list_items(raw)
        .into_iter()
        .map(|item| candidate_from_text(&item))
        .collect()
}

fn candidate_from_value(value: &serde_json::Value) -> Option<Candidate> {
    if let Some(text) = value.as_str() {
        return Some(candidate_from_text(text)).filter(|c| !c.description.is_empty());
    }

    let field = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| value.get(*name).and_then(|v| v.as_str()))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let title = field(&["title", "name", "angle"]);
    let description = field(&["description", "question", "focus"]);
    let search_query = field(&["search_query", "query", "keywords"]);

    if title.is_empty() && description.is_empty() {
        return None;
    }

    let description = if description.is_empty() {
        title.clone()
    } else {
        description
    };
    let title = if title.is_empty() {
        short_title(&description)
    } else {
        title
    };
    let search_query = if search_query.is_empty() {
        derive_query(&description)
    } else {
        search_query
    };

    Some(Candidate {
        title,
        description,
        search_query,
    })
}

/// `Title: rest` splits into title and description; otherwise the text is both
fn candidate_from_text(text: &str) -> Candidate {
    let text = text.trim();
    let (title, description) = match text.split_once(':') {
        Some((head, tail)) if !head.trim().is_empty() && !tail.trim().is_empty() => {
            (head.trim().to_string(), text.to_string())
        }
        _ => (short_title(text), text.to_string()),
    };
    Candidate {
        search_query: derive_query(&description),
        title,
        description,
    }
}

fn normalize(question: &str, candidates: Vec<Candidate>, task_count: usize) -> Vec<SubTask> {
    let mut seen = HashSet::new();
    let mut chosen: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| seen.insert(c.description.to_lowercase()))
        .take(task_count)
        .collect();

    if chosen.len() < task_count {
        let question = question.trim();
        let present: HashSet<String> = chosen.iter().map(|c| c.title.to_lowercase()).collect();
        let padding = GENERIC_ANGLES
            .iter()
            .filter(|(title, _)| !present.contains(&title.to_lowercase()))
            .map(|(title, focus)| Candidate {
                title: title.to_string(),
                description: format!("{} (focus: {})", question, focus),
                search_query: derive_query(question),
            });
        let missing = task_count - chosen.len();
        debug!("Padding {} generic angles", missing);
        chosen.extend(padding.take(missing));
    }

    chosen
        .into_iter()
        .enumerate()
        .map(|(idx, c)| SubTask {
            id: format!("T{}", idx + 1),
            title: c.title,
            description: c.description,
            search_query: c.search_query,
        })
        .collect()
}

fn short_title(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().take(6).collect();
    if words.len() > 1 {
        words.join(" ")
    } else {
        text.chars().take(24).collect()
    }
}

/// Keyword query from free text; falls back to a prefix of the text for
/// scripts without word separators
fn derive_query(text: &str) -> String {
    let keywords: Vec<String> = text
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > 1 && !STOPWORDS.contains(&w.as_str()))
        .take(6)
        .collect();

    if keywords.len() >= 2 {
        keywords.join(" ")
    } else {
        text.trim().chars().take(60).collect()
    }
}
