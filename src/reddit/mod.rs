//! Platform search client and the seam the fetcher talks through

mod client;
mod throttle;
mod types;

pub use client::RedditClient;
pub use throttle::Throttle;

use crate::error::FetchError;
use crate::request::{Sort, TimeFilter};
use crate::types::ContentItem;
use async_trait::async_trait;

/// One page request against the platform search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub subreddit: String,
    pub query: String,
    pub sort: Sort,
    pub time_filter: TimeFilter,
    /// Items wanted on this page
    pub limit: u32,
    /// Cursor from the previous page
    pub after: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<ContentItem>,
    /// Cursor for the next page; `None` when the listing is exhausted
    pub after: Option<String>,
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_page(&self, query: &PageQuery) -> Result<Page, FetchError>;
}
