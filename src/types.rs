//! Entities produced and consumed by the pipeline stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One decomposed facet of the research question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    /// Stable id within a run (`T1`..`Tn`)
    pub id: String,

    pub title: String,

    pub description: String,

    /// Keyword query used to search the platform for this facet
    pub search_query: String,
}

/// A post fetched from the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Platform-unique id
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub metadata: ItemMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub author: String,
    pub score: i64,
    pub created_utc: Option<DateTime<Utc>>,
    pub permalink: String,
    pub subreddit: String,
    #[serde(default)]
    pub num_comments: u64,
}

impl ContentItem {
    /// Title and body as one block of text
    pub fn text(&self) -> String {
        let body = self.body.trim();
        if body.is_empty() {
            self.title.trim().to_string()
        } else {
            format!("{}\n\n{}", self.title.trim(), body)
        }
    }

    /// Text cut to at most `max_chars` characters, on a char boundary
    pub fn snippet(&self, max_chars: usize) -> String {
        let text = self.text();
        if text.chars().count() <= max_chars {
            return text;
        }
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}…", cut.trim_end())
    }
}

/// Outcome of labeling a single item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LabelStatus {
    /// At least one sub-task matched
    Labeled,
    /// The model found no matching sub-task (or omitted the item)
    Unmatched,
    /// The item's batch could not be labeled
    Failed { error: String },
}

/// A content item annotated with the sub-tasks it relates to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledItem {
    pub item: ContentItem,

    /// Ids of matching sub-tasks; always a subset of the run's sub-task ids
    pub labels: BTreeSet<String>,

    #[serde(default)]
    pub rationale: String,

    /// Representative quote picked by the model, if any
    #[serde(default)]
    pub quote: Option<String>,

    pub status: LabelStatus,
}

impl LabeledItem {
    pub fn unmatched(item: ContentItem, rationale: impl Into<String>) -> Self {
        Self {
            item,
            labels: BTreeSet::new(),
            rationale: rationale.into(),
            quote: None,
            status: LabelStatus::Unmatched,
        }
    }

    pub fn failed(item: ContentItem, error: impl Into<String>) -> Self {
        Self {
            item,
            labels: BTreeSet::new(),
            rationale: String::new(),
            quote: None,
            status: LabelStatus::Failed {
                error: error.into(),
            },
        }
    }

    pub fn has_label(&self, subtask_id: &str) -> bool {
        self.labels.contains(subtask_id)
    }
}

#[cfg(test)]
pub(crate) fn sample_item(id: &str, score: i64) -> ContentItem {
    ContentItem {
        id: id.to_string(),
        title: format!("Post {}", id),
        body: format!("Body of post {}", id),
        metadata: ItemMetadata {
            author: format!("user_{}", id),
            score,
            created_utc: DateTime::from_timestamp(1_700_000_000, 0),
            permalink: format!("/r/coffee/comments/{}/post/", id),
            subreddit: "coffee".to_string(),
            num_comments: 3,
        },
    }
}

#[cfg(test)]
pub(crate) fn sample_subtasks(n: usize) -> Vec<SubTask> {
    (1..=n)
        .map(|i| SubTask {
            id: format!("T{}", i),
            title: format!("Angle {}", i),
            description: format!("Description of angle {}", i),
            search_query: format!("query {}", i),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_skips_empty_body() {
        let mut item = sample_item("a1", 1);
        item.body = "  ".to_string();
        assert_eq!(item.text(), "Post a1");
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let mut item = sample_item("a1", 1);
        item.title = "咖啡机".repeat(10);
        item.body = String::new();
        let snippet = item.snippet(5);
        assert_eq!(snippet, "咖啡机咖啡…");
    }
}
