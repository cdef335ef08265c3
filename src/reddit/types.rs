use crate::types::{ContentItem, ItemMetadata};
use chrono::DateTime;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
pub(crate) struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingData {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Thing {
    pub kind: String,
    pub data: PostData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostData {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub created_utc: Option<f64>,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub num_comments: u64,
}

impl From<PostData> for ContentItem {
    fn from(post: PostData) -> Self {
        ContentItem {
            id: post.id,
            title: post.title,
            body: post.selftext,
            metadata: ItemMetadata {
                author: post.author.unwrap_or_else(|| "[deleted]".to_string()),
                score: post.score,
                created_utc: post
                    .created_utc
                    .and_then(|ts| DateTime::from_timestamp(ts as i64, 0)),
                permalink: post.permalink,
                subreddit: post.subreddit,
                num_comments: post.num_comments,
            },
        }
    }
}

impl Listing {
    /// Posts on this page (kind `t3`), converted to content items
    pub fn into_items(self) -> (Vec<ContentItem>, Option<String>) {
        let items = self
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t3")
            .map(|thing| ContentItem::from(thing.data))
            .collect();
        (items, self.data.after.filter(|a| !a.is_empty()))
    }
}
