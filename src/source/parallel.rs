//! Isolated fan-out/fan-in for category fetches.
//!
//! Every item is fetched concurrently (bounded by `max_concurrent`) and its
//! result lands in its own slot, so one failing fetch never cancels or hides
//! the others.

use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};
use log::debug;

use crate::error::{Error, Result};

async fn tagged<Fut: Future>(slot: usize, fut: Fut) -> (usize, Fut::Output) {
    (slot, fut.await)
}

/// Run `fetch` for every item concurrently and return each item with its own result.
///
/// Results come back in input order regardless of completion order.
///
/// # Example
///
/// ```ignore
/// let results = fetch_isolated(
///     family.categories(),
///     |category| source.fetch_category(&platform_id, category),
///     8,
/// )
/// .await;
///
/// for (category, result) in results {
///     match result {
///         Ok(raw) => { /* normalize */ }
///         Err(e) => log::warn!("{} failed: {}", category, e),
///     }
/// }
/// ```
pub async fn fetch_isolated<I, T, F, Fut>(
    items: Vec<I>,
    fetch: F,
    max_concurrent: usize,
) -> Vec<(I, Result<T>)>
where
    I: Clone,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if items.is_empty() {
        return Vec::new();
    }

    let max_concurrent = max_concurrent.max(1);
    debug!(
        "Fetching {} items with max {} concurrent",
        items.len(),
        max_concurrent
    );

    let mut slots: Vec<Option<Result<T>>> = (0..items.len()).map(|_| None).collect();
    let mut futures = FuturesUnordered::new();
    let mut pending = items.iter().cloned().enumerate();

    // Seed initial batch up to max_concurrent
    for (slot, item) in pending.by_ref().take(max_concurrent) {
        futures.push(tagged(slot, fetch(item)));
    }

    // Keep the window full until every item has a result
    while let Some((slot, result)) = futures.next().await {
        slots[slot] = Some(result);

        if let Some((next_slot, item)) = pending.next() {
            futures.push(tagged(next_slot, fetch(item)));
        }
    }

    items
        .into_iter()
        .zip(slots)
        .map(|(item, slot)| {
            let result = slot.unwrap_or_else(|| Err(Error::Other("fetch did not run".to_string())));
            (item, result)
        })
        .collect()
}
