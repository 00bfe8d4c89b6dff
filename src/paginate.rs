//! Pagination collector.
//!
//! Drives a page-numbered listing through the [`RateLimitedFetcher`] until the
//! upstream reports no next page. A rate-limited page is retried with the same
//! page number, so items are neither lost nor duplicated across a backoff.

use std::future::Future;

use tracing::debug;

use crate::error::{FetchError, GithubError};
use crate::fetcher::RateLimitedFetcher;
use crate::models::Page;

/// Collects every item of a paginated listing in arrival order.
///
/// `fetch_page` receives the 1-based page number to request. There is no page
/// limit; the loop ends on the upstream's own exhaustion signal.
pub async fn collect_all<T, F, Fut>(
    fetcher: &RateLimitedFetcher,
    mut fetch_page: F,
) -> Result<Vec<T>, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, GithubError>>,
{
    let mut items = Vec::new();
    let mut page = 1u32;

    loop {
        let batch = fetcher.attempt(|| fetch_page(page)).await?;
        debug!(page, count = batch.items.len(), "fetched page");
        items.extend(batch.items);

        match batch.next_page {
            // Guard against an upstream that points back at a page already read.
            Some(next) if next > page => page = next,
            _ => break,
        }
    }

    Ok(items)
}
