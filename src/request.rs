//! Research request parameters and their validation

use crate::error::InvalidRequestError;
use serde::{Deserialize, Serialize};

pub const LIMIT_MIN: u32 = 10;
pub const LIMIT_MAX: u32 = 300;
pub const TASK_COUNT_MIN: u32 = 1;
pub const TASK_COUNT_MAX: u32 = 8;

/// Listing order requested from the platform search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
    #[default]
    New,
    Relevance,
    Hot,
    Top,
    Comments,
}

impl Sort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sort::New => "new",
            Sort::Relevance => "relevance",
            Sort::Hot => "hot",
            Sort::Top => "top",
            Sort::Comments => "comments",
        }
    }
}

impl std::fmt::Display for Sort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sort {
    type Err = InvalidRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(Sort::New),
            "relevance" => Ok(Sort::Relevance),
            "hot" => Ok(Sort::Hot),
            "top" => Ok(Sort::Top),
            "comments" => Ok(Sort::Comments),
            _ => Err(InvalidRequestError::UnknownSort(s.to_string())),
        }
    }
}

/// Time window applied to the search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    #[default]
    Year,
    Month,
    Week,
    Day,
    Hour,
    All,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Year => "year",
            TimeFilter::Month => "month",
            TimeFilter::Week => "week",
            TimeFilter::Day => "day",
            TimeFilter::Hour => "hour",
            TimeFilter::All => "all",
        }
    }
}

impl std::fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TimeFilter {
    type Err = InvalidRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "year" => Ok(TimeFilter::Year),
            "month" => Ok(TimeFilter::Month),
            "week" => Ok(TimeFilter::Week),
            "day" => Ok(TimeFilter::Day),
            "hour" => Ok(TimeFilter::Hour),
            "all" => Ok(TimeFilter::All),
            _ => Err(InvalidRequestError::UnknownTimeFilter(s.to_string())),
        }
    }
}

/// One research run's parameters. Immutable once the pipeline starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchRequest {
    pub question: String,
    pub subreddit: String,
    pub limit: u32,
    pub task_count: u32,
    pub sort: Sort,
    pub time_filter: TimeFilter,
    pub model: String,
}

impl ResearchRequest {
    /// Check bounds and shapes before any network call is made
    pub fn validate(&self) -> Result<(), InvalidRequestError> {
        if self.question.trim().is_empty() {
            return Err(InvalidRequestError::EmptyQuestion);
        }
        if !(LIMIT_MIN..=LIMIT_MAX).contains(&self.limit) {
            return Err(InvalidRequestError::LimitOutOfRange(self.limit));
        }
        if !(TASK_COUNT_MIN..=TASK_COUNT_MAX).contains(&self.task_count) {
            return Err(InvalidRequestError::TaskCountOutOfRange(self.task_count));
        }
        if !is_valid_subreddit(&self.subreddit) {
            return Err(InvalidRequestError::InvalidSubreddit(self.subreddit.clone()));
        }
        if self.model.trim().is_empty() {
            return Err(InvalidRequestError::EmptyModel);
        }
        Ok(())
    }
}

/// Subreddit names are 2-21 chars of `[A-Za-z0-9_]`; multireddits join them with `+`
fn is_valid_subreddit(name: &str) -> bool {
    !name.is_empty()
        && name.split('+').all(|part| {
            (2..=21).contains(&part.len())
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[cfg(test)]
pub(crate) fn sample_request() -> ResearchRequest {
    ResearchRequest {
        question: "coffee machine concerns".to_string(),
        subreddit: "all".to_string(),
        limit: 60,
        task_count: 4,
        sort: Sort::New,
        time_filter: TimeFilter::Year,
        model: "claude-test".to_string(),
    }
}
