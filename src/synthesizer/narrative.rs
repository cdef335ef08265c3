use crate::config::Config;
use crate::error::{Stage, SynthesisError};
use crate::pipeline::retry_with_backoff;
use crate::provider::{CompletionRequest, LlmClient};
use crate::request::ResearchRequest;
use crate::types::{LabelStatus, LabeledItem, SubTask};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

const SYNTHESIZE_PROMPT: &str = include_str!("../../prompts/synthesize.md");

const SYSTEM: &str = "You are writing an insight report from labeled Reddit posts.";

const UNVERIFIED: &str = "[unverified]";

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[#([A-Za-z0-9_]+)\]").unwrap());

/// Narrative body with its citations checked against the corpus
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GroundedBody {
    pub text: String,
    /// Valid cited ids in order of first citation
    pub cited: Vec<String>,
}

/// Write the narrative insight report.
///
/// Only labeled items are passed to the model as grounding. Citations of ids
/// outside that corpus are replaced with `[unverified]`; an answer citing
/// nothing valid is treated as a failed attempt.
pub async fn write_narrative(
    llm: &dyn LlmClient,
    config: &Config,
    request: &ResearchRequest,
    subtasks: &[SubTask],
    items: &[LabeledItem],
) -> Result<String, SynthesisError> {
    let mut corpus: Vec<&LabeledItem> = items
        .iter()
        .filter(|l| l.status == LabelStatus::Labeled)
        .collect();
    corpus.sort_by(|a, b| {
        b.item
            .metadata
            .score
            .cmp(&a.item.metadata.score)
            .then_with(|| a.item.id.cmp(&b.item.id))
    });

    if corpus.is_empty() {
        info!("No labeled items, writing empty narrative without a model call");
        let body = GroundedBody {
            text: "No fetched item matched any of the sub-tasks, so there is no evidence \
                   to synthesize. See the raw report for everything that was retrieved."
                .to_string(),
            cited: Vec::new(),
        };
        return Ok(render_report(request, subtasks, items, &corpus, &body));
    }

    info!("Synthesizing narrative from {} labeled items", corpus.len());

    let completion = CompletionRequest {
        stage: Stage::Synthesize,
        model: request.model.clone(),
        system: Some(SYSTEM.to_string()),
        prompt: render_prompt(request, subtasks, &corpus, config.llm.snippet_chars),
        max_tokens: config.llm.synthesize_max_tokens,
        temperature: config.llm.temperature,
    };
    let known: HashSet<&str> = corpus.iter().map(|l| l.item.id.as_str()).collect();

    let body =
        retry_with_backoff(&config.retry, || narrative_once(llm, &completion, &known)).await?;

    Ok(render_report(request, subtasks, items, &corpus, &body))
}

async fn narrative_once(
    llm: &dyn LlmClient,
    request: &CompletionRequest,
    known: &HashSet<&str>,
) -> Result<GroundedBody, SynthesisError> {
    let output = llm.complete(request).await?;
    debug!("Narrative draft took {:?}", output.duration);
    ground(&output.text, known)
}

/// Check `[#id]` citations against the corpus
pub(crate) fn ground(text: &str, known: &HashSet<&str>) -> Result<GroundedBody, SynthesisError> {
    let mut cited = Vec::new();
    let mut seen = HashSet::new();
    let mut unverified = 0usize;

    let grounded = CITATION_RE.replace_all(text.trim(), |caps: &regex::Captures| {
        let id = &caps[1];
        if known.contains(id) {
            if seen.insert(id.to_string()) {
                cited.push(id.to_string());
            }
            caps[0].to_string()
        } else {
            unverified += 1;
            UNVERIFIED.to_string()
        }
    });
    let grounded = grounded.into_owned();

    if unverified > 0 {
        warn!("Replaced {} citations of unknown items", unverified);
    }
    if cited.is_empty() {
        return Err(SynthesisError::Ungrounded);
    }
    Ok(GroundedBody {
        text: grounded,
        cited,
    })
}

fn render_prompt(
    request: &ResearchRequest,
    subtasks: &[SubTask],
    corpus: &[&LabeledItem],
    snippet_chars: usize,
) -> String {
    let tasks: String = subtasks
        .iter()
        .map(|t| format!("- {} ({}): {}\n", t.id, t.title, t.description))
        .collect();

    let mut posts = String::new();
    for entry in corpus {
        let labels: Vec<&str> = entry.labels.iter().map(String::as_str).collect();
        posts.push_str(&format!(
            "#### [#{}] labels: {} · score: {}\n",
            entry.item.id,
            labels.join(", "),
            entry.item.metadata.score
        ));
        if let Some(quote) = &entry.quote {
            posts.push_str(&format!("Key quote: \"{}\"\n", quote));
        }
        posts.push_str(&entry.item.snippet(snippet_chars));
        posts.push_str("\n\n");
    }

    SYNTHESIZE_PROMPT
        .replace("{{QUESTION}}", request.question.trim())
        .replace("{{SUBTASKS}}", tasks.trim_end())
        .replace("{{CORPUS}}", posts.trim_end())
}

fn render_report(
    request: &ResearchRequest,
    subtasks: &[SubTask],
    items: &[LabeledItem],
    corpus: &[&LabeledItem],
    body: &GroundedBody,
) -> String {
    let mut content = String::new();

    content.push_str("# Insight Report\n\n");
    content.push_str("| Field | Value |\n");
    content.push_str("|-------|-------|\n");
    content.push_str(&format!("| Question | {} |\n", table_cell(&request.question)));
    content.push_str(&format!("| Subreddit | r/{} |\n", request.subreddit));
    content.push_str(&format!(
        "| Sort | {} ({}) |\n",
        request.sort, request.time_filter
    ));
    content.push_str(&format!(
        "| Items | {} fetched, {} labeled |\n",
        items.len(),
        corpus.len()
    ));
    content.push_str(&format!("| Model | {} |\n", request.model));
    content.push('\n');

    content.push_str("## Sub-tasks\n\n");
    for task in subtasks {
        content.push_str(&format!(
            "- **{} · {}**: {}\n",
            task.id, task.title, task.description
        ));
    }
    content.push('\n');

    content.push_str("## Findings\n\n");
    content.push_str(&body.text);
    content.push_str("\n\n");

    if !body.cited.is_empty() {
        let by_id: HashMap<&str, &LabeledItem> =
            corpus.iter().map(|l| (l.item.id.as_str(), *l)).collect();

        content.push_str("## Sources\n\n");
        for id in &body.cited {
            let Some(entry) = by_id.get(id.as_str()) else {
                continue;
            };
            let meta = &entry.item.metadata;
            content.push_str(&format!(
                "- [#{}] {} (score {}, u/{}) https://www.reddit.com{}\n",
                id,
                table_cell(&entry.item.title),
                meta.score,
                meta.author,
                meta.permalink
            ));
        }
    }

    content
}

fn table_cell(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}
