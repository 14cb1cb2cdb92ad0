//! Bounded-concurrency fetching of many URLs.
//!
//! At most `max_workers` fetches are in flight at once. Results come back
//! in submission order regardless of which fetch finishes first, and a
//! failed fetch still occupies its slot (its error text stands in for the
//! content). Nothing is retried.

use futures::stream::{self, StreamExt};
use tracing::info;

use crate::fetcher::ContentFetcher;
use crate::models::FetchResult;

/// Fetch every URL, returning one [`FetchResult`] per input in input order.
pub async fn fetch_all_results(
    fetcher: &ContentFetcher,
    urls: &[String],
    max_workers: usize,
) -> Vec<FetchResult> {
    if urls.is_empty() {
        return Vec::new();
    }
    info!(
        "Fetching {} URL(s) with up to {} concurrent workers",
        urls.len(),
        max_workers
    );

    stream::iter(urls.iter().cloned())
        .map(|url| async move { fetcher.fetch(&url).await })
        .buffered(max_workers.max(1))
        .collect()
        .await
}

/// Fetch every URL, returning each page's text (or error text) in input order.
pub async fn fetch_all(fetcher: &ContentFetcher, urls: &[String], max_workers: usize) -> Vec<String> {
    fetch_all_results(fetcher, urls, max_workers)
        .await
        .into_iter()
        .map(FetchResult::into_text)
        .collect()
}
