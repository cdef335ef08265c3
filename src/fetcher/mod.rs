//! Bounded, deduplicated retrieval of content items
//!
//! One paged search runs per distinct sub-task query, concurrently under the
//! configured bound, each asking for an even share of `limit`. Results are
//! merged in query order and deduplicated by id. When overlapping queries
//! leave the merge short, queries that still have a cursor keep paging in
//! turn until `limit` is reached or every query is exhausted.

use crate::config::Config;
use crate::error::FetchError;
use crate::pipeline::retry_with_backoff;
use crate::reddit::{ContentSource, PageQuery};
use crate::request::ResearchRequest;
use crate::types::ContentItem;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub items: Vec<ContentItem>,
    /// Partial failures that did not abort the fetch
    pub warnings: Vec<String>,
}

/// Paging position of one query
struct QueryCursor {
    index: usize,
    base: PageQuery,
    /// Ids this query has returned so far, across all its pages
    seen: HashSet<String>,
    after: Option<String>,
    exhausted: bool,
}

impl QueryCursor {
    fn new(index: usize, base: PageQuery) -> Self {
        Self {
            index,
            base,
            seen: HashSet::new(),
            after: None,
            exhausted: false,
        }
    }

    fn is_open(&self) -> bool {
        !self.exhausted
    }

    /// Fetch the next page and return the items new to this query.
    /// The cursor closes on the last page, on a page with nothing new and on
    /// an error.
    async fn next_page(
        &mut self,
        source: &dyn ContentSource,
        config: &Config,
        want: usize,
    ) -> Result<Vec<ContentItem>, FetchError> {
        let page_query = PageQuery {
            limit: want as u32,
            after: self.after.clone(),
            ..self.base.clone()
        };

        let page = match retry_with_backoff(&config.retry, || source.fetch_page(&page_query)).await
        {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };

        let seen = &mut self.seen;
        let fresh: Vec<ContentItem> = page
            .items
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect();

        debug!(
            "Query '{}' page added {} items ({} total)",
            self.base.query,
            fresh.len(),
            self.seen.len()
        );

        if fresh.is_empty() || page.after.is_none() {
            self.exhausted = true;
        }
        self.after = page.after;
        Ok(fresh)
    }

    fn warning(&self, err: &FetchError) -> String {
        format!(
            "query '{}' stopped after {} items: {}",
            self.base.query,
            self.seen.len(),
            err
        )
    }
}

struct QueryResult {
    cursor: QueryCursor,
    items: Vec<ContentItem>,
    error: Option<FetchError>,
}

pub async fn fetch(
    source: &dyn ContentSource,
    config: &Config,
    request: &ResearchRequest,
    queries: &[String],
) -> Result<FetchOutcome, FetchError> {
    let queries = distinct_queries(queries, &request.question);
    let limit = request.limit as usize;
    let quota = limit.div_ceil(queries.len());
    let page_size = (config.reddit.page_size as usize).max(1);

    info!(
        "Fetching up to {} items from r/{} via {} queries ({} each, source {})",
        limit,
        request.subreddit,
        queries.len(),
        quota,
        source.name()
    );

    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let mut futures = FuturesUnordered::new();

    for (index, query) in queries.iter().enumerate() {
        let semaphore = semaphore.clone();
        let cursor = QueryCursor::new(
            index,
            PageQuery {
                subreddit: request.subreddit.clone(),
                query: query.clone(),
                sort: request.sort,
                time_filter: request.time_filter,
                limit: 0,
                after: None,
            },
        );
        futures.push(async move {
            let _permit = semaphore.acquire_owned().await;
            fetch_query(source, config, cursor, quota, page_size).await
        });
    }

    let mut results = Vec::with_capacity(queries.len());
    while let Some(result) = futures.next().await {
        if let Some(FetchError::Auth { .. }) = &result.error {
            warn!("Authentication rejected, aborting fetch");
            return Err(result.error.unwrap_or(FetchError::NoResults));
        }
        results.push(result);
    }
    results.sort_by_key(|r| r.cursor.index);

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    let mut warnings = Vec::new();
    let mut last_error = None;
    let mut cursors = Vec::with_capacity(results.len());

    for result in results {
        if let Some(err) = result.error {
            let warning = result.cursor.warning(&err);
            warn!("{}", warning);
            warnings.push(warning);
            last_error = Some(err);
        }
        for item in result.items {
            if seen.insert(item.id.clone()) {
                items.push(item);
            }
        }
        cursors.push(result.cursor);
    }

    // Overlapping queries: keep paging open cursors until the limit is met
    while items.len() < limit && cursors.iter().any(QueryCursor::is_open) {
        debug!(
            "Topping up: {} of {} unique items after overlap",
            items.len(),
            limit
        );
        for cursor in cursors.iter_mut().filter(|c| c.is_open()) {
            if items.len() >= limit {
                break;
            }
            let want = (limit - items.len()).min(page_size);
            match cursor.next_page(source, config, want).await {
                Ok(fresh) => {
                    for item in fresh {
                        if seen.insert(item.id.clone()) {
                            items.push(item);
                        }
                    }
                }
                Err(e @ FetchError::Auth { .. }) => {
                    warn!("Authentication rejected, aborting fetch");
                    return Err(e);
                }
                Err(e) => {
                    let warning = cursor.warning(&e);
                    warn!("{}", warning);
                    warnings.push(warning);
                    last_error = Some(e);
                }
            }
        }
    }
    items.truncate(limit);

    if items.is_empty() {
        return Err(last_error.unwrap_or(FetchError::NoResults));
    }

    info!(
        "Fetched {} unique items ({} warnings)",
        items.len(),
        warnings.len()
    );
    Ok(FetchOutcome { items, warnings })
}

/// Page through one query until `quota` items, exhaustion or a failure
async fn fetch_query(
    source: &dyn ContentSource,
    config: &Config,
    mut cursor: QueryCursor,
    quota: usize,
    page_size: usize,
) -> QueryResult {
    let mut items = Vec::new();
    let mut error = None;

    while items.len() < quota && cursor.is_open() {
        let want = (quota - items.len()).min(page_size);
        match cursor.next_page(source, config, want).await {
            Ok(fresh) => items.extend(fresh),
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }

    QueryResult {
        cursor,
        items,
        error,
    }
}

/// Non-empty queries in first-seen order, compared case-insensitively.
/// Falls back to the research question when nothing usable remains.
fn distinct_queries(queries: &[String], question: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let distinct: Vec<String> = queries
        .iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .collect();

    if distinct.is_empty() {
        vec![question.trim().to_string()]
    } else {
        distinct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::sample_request;
    use crate::testing::FakeSource;
    use crate::types::sample_item;

    fn config() -> Config {
        let mut config = Config::default();
        config.retry.backoff_base_ms = 1;
        config.reddit.page_size = 10;
        config
    }

    fn pool(n: usize) -> Vec<ContentItem> {
        (0..n).map(|i| sample_item(&format!("p{:03}", i), i as i64)).collect()
    }

    fn queries(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("query {}", i)).collect()
    }

    #[tokio::test]
    async fn test_respects_limit_and_unique_ids() {
        let source = FakeSource::with_items(pool(500));
        let mut request = sample_request();
        request.limit = 60;

        let outcome = fetch(&source, &config(), &request, &queries(4)).await.unwrap();

        assert_eq!(outcome.items.len(), 60);
        let ids: HashSet<_> = outcome.items.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids.len(), 60);
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_uneven_split_never_exceeds_limit() {
        let source = FakeSource::with_items(pool(500));
        let mut request = sample_request();
        request.limit = 10;

        let outcome = fetch(&source, &config(), &request, &queries(3)).await.unwrap();
        assert_eq!(outcome.items.len(), 10);
    }

    #[tokio::test]
    async fn test_exhausted_source_returns_fewer() {
        let source = FakeSource::with_items(pool(7));
        let mut request = sample_request();
        request.limit = 60;

        let outcome = fetch(&source, &config(), &request, &queries(2)).await.unwrap();
        assert_eq!(outcome.items.len(), 7);
    }

    #[tokio::test]
    async fn test_overlapping_queries_fill_to_limit() {
        // Every query pages through the same listing
        let source = FakeSource::listing(pool(500));
        let mut request = sample_request();
        request.limit = 60;

        let outcome = fetch(&source, &config(), &request, &queries(4)).await.unwrap();

        let ids: HashSet<_> = outcome.items.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids.len(), outcome.items.len());
        assert!(outcome.items.len() <= 60);
        assert_eq!(outcome.items.len(), 60);
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_queries_stop_when_exhausted() {
        let source = FakeSource::listing(pool(25));
        let mut request = sample_request();
        request.limit = 60;

        let outcome = fetch(&source, &config(), &request, &queries(3)).await.unwrap();

        let ids: HashSet<_> = outcome.items.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids.len(), 25);
        assert_eq!(outcome.items.len(), 25);
    }

    #[tokio::test]
    async fn test_top_up_failure_becomes_warning() {
        // The first pass succeeds, every top-up page fails
        let source = FakeSource::listing(pool(500)).failing_when(|call| {
            (call >= 2).then(|| FetchError::Upstream {
                status: 503,
                message: "unavailable".to_string(),
            })
        });
        let mut request = sample_request();
        request.limit = 20;

        let outcome = fetch(&source, &config(), &request, &queries(2)).await.unwrap();

        assert_eq!(outcome.items.len(), 10);
        assert_eq!(outcome.warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_items_with_warning() {
        // First page succeeds; every later call fails with a server error
        let source = FakeSource::with_items(pool(500)).failing_when(|call| {
            (call > 0).then(|| FetchError::Upstream {
                status: 503,
                message: "unavailable".to_string(),
            })
        });
        let mut request = sample_request();
        request.limit = 30;

        let outcome = fetch(&source, &config(), &request, &queries(1)).await.unwrap();

        assert_eq!(outcome.items.len(), 10);
        assert_eq!(outcome.warnings.len(), 1);
        // 1 success + 3 attempts on the failing page
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn test_zero_items_with_failure_is_error() {
        let source = FakeSource::with_items(pool(50))
            .failing_when(|_| Some(FetchError::Network("connection reset".to_string())));
        let request = sample_request();

        let result = fetch(&source, &config(), &request, &queries(2)).await;
        assert!(matches!(result, Err(FetchError::Network(_))));
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let source = FakeSource::with_items(pool(50)).failing_when(|_| {
            Some(FetchError::Auth {
                status: 401,
                message: "invalid_grant".to_string(),
            })
        });
        let request = sample_request();

        let result = fetch(&source, &config(), &request, &queries(1)).await;
        assert!(matches!(result, Err(FetchError::Auth { .. })));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_source_is_no_results() {
        let source = FakeSource::with_items(Vec::new());
        let result = fetch(&source, &config(), &sample_request(), &queries(2)).await;
        assert!(matches!(result, Err(FetchError::NoResults)));
    }

    #[test]
    fn test_distinct_queries() {
        let qs = vec![
            "Grinder noise".to_string(),
            "grinder noise".to_string(),
            "  ".to_string(),
            "price".to_string(),
        ];
        assert_eq!(distinct_queries(&qs, "q"), vec!["Grinder noise", "price"]);
        assert_eq!(distinct_queries(&[], " the question "), vec!["the question"]);
    }
}
