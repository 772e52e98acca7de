//! Single-flight parse cache keyed by canonical feed URL.
//!
//! The first caller for a key spawns a population task; concurrent callers for the
//! same key await that task's shared result instead of fetching again. The task
//! writes its outcome into the cache itself, so a caller that stops waiting does
//! not abort the population other callers depend on.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::fetch::{FetchOptions, Fetcher};
use super::parser::{FeedParser, ParsedFeed};

/// Errors returned by [`FeedCache::resolve_feed`].
///
/// Cloneable so one failed population can be reported to every waiter.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The fetch itself failed (network error, timeout, oversized body)
    #[error("Fetch failed: {0}")]
    Fetch(String),
    /// The server answered with a non-2xx status
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The body was fetched but is not a valid feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// The population task panicked or was cancelled by the runtime
    #[error("Feed population task failed: {0}")]
    TaskFailed(String),
}

/// A populated cache slot.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Arc<ParsedFeed>,
    pub fetched_at: DateTime<Utc>,
}

type Population = Shared<BoxFuture<'static, Result<Arc<ParsedFeed>, CacheError>>>;

enum Slot {
    Ready(CacheEntry),
    Pending(Population),
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

/// Process-lifetime cache of parsed feeds.
///
/// Construct once and share by reference (or clone the handle); there is no global
/// instance. Entries never expire on their own; see [`FeedCache::invalidate`].
pub struct FeedCache<F, P> {
    fetcher: Arc<F>,
    parser: Arc<P>,
    options: FetchOptions,
    slots: Slots,
}

impl<F, P> Clone for FeedCache<F, P> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            parser: Arc::clone(&self.parser),
            options: self.options,
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<F: Fetcher, P: FeedParser> FeedCache<F, P> {
    pub fn new(fetcher: Arc<F>, parser: Arc<P>, options: FetchOptions) -> Self {
        Self {
            fetcher,
            parser,
            options,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the parsed feed for `canonical_url`, fetching it on a miss.
    ///
    /// Hits never touch the network. Failures leave the key unpopulated so the next
    /// call retries from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the fetch fails, the status is not 2xx, or the
    /// body does not parse as a feed.
    pub async fn resolve_feed(&self, canonical_url: &str) -> Result<Arc<ParsedFeed>, CacheError> {
        let population = {
            let mut slots = lock(&self.slots);
            match slots.get(canonical_url) {
                Some(Slot::Ready(entry)) => {
                    tracing::trace!(url = %canonical_url, "Feed cache hit");
                    return Ok(Arc::clone(&entry.value));
                }
                Some(Slot::Pending(population)) => {
                    tracing::debug!(url = %canonical_url, "Joining in-flight feed population");
                    population.clone()
                }
                None => {
                    tracing::debug!(url = %canonical_url, "Feed cache miss");
                    let population = self.spawn_population(canonical_url);
                    slots.insert(canonical_url.to_owned(), Slot::Pending(population.clone()));
                    population
                }
            }
        };

        population.await
    }

    /// Whether a parsed feed is stored for `key`.
    pub fn contains(&self, key: &str) -> bool {
        matches!(lock(&self.slots).get(key), Some(Slot::Ready(_)))
    }

    /// The stored entry for `key`, including when it was fetched.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        match lock(&self.slots).get(key) {
            Some(Slot::Ready(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    /// Number of populated entries.
    pub fn len(&self) -> usize {
        lock(&self.slots)
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops the stored entry for `key` so the next resolve fetches again.
    ///
    /// In-flight populations are left alone. Returns whether an entry was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut slots = lock(&self.slots);
        if matches!(slots.get(key), Some(Slot::Ready(_))) {
            slots.remove(key);
            true
        } else {
            false
        }
    }

    fn spawn_population(&self, canonical_url: &str) -> Population {
        let fetcher = Arc::clone(&self.fetcher);
        let parser = Arc::clone(&self.parser);
        let slots = Arc::clone(&self.slots);
        let options = self.options;
        let key = canonical_url.to_owned();

        let task_slots = Arc::clone(&slots);
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let (slots, key) = (task_slots, task_key);
            // A panicking parser must still reach the cleanup below
            let result = AssertUnwindSafe(fetch_and_parse(
                fetcher.as_ref(),
                parser.as_ref(),
                &key,
                options,
            ))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(CacheError::TaskFailed(panic_message(panic.as_ref()))));

            let mut slots = lock(&slots);
            match &result {
                Ok(feed) => {
                    tracing::debug!(url = %key, items = feed.items.len(), "Feed cached");
                    slots.insert(
                        key.clone(),
                        Slot::Ready(CacheEntry {
                            key: key.clone(),
                            value: Arc::clone(feed),
                            fetched_at: Utc::now(),
                        }),
                    );
                }
                Err(e) => {
                    tracing::warn!(url = %key, error = %e, "Feed population failed");
                    slots.remove(&key);
                }
            }
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    // The task died before clearing its slot
                    let mut slots = lock(&slots);
                    if matches!(slots.get(&key), Some(Slot::Pending(_))) {
                        slots.remove(&key);
                    }
                    tracing::warn!(url = %key, error = %e, "Feed population task aborted");
                    Err(CacheError::TaskFailed(e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }
}

async fn fetch_and_parse<F: Fetcher, P: FeedParser>(
    fetcher: &F,
    parser: &P,
    url: &str,
    options: FetchOptions,
) -> Result<Arc<ParsedFeed>, CacheError> {
    let response = fetcher
        .fetch(url, options)
        .await
        .map_err(|e| CacheError::Fetch(e.to_string()))?;

    if !response.is_success() {
        return Err(CacheError::HttpStatus(response.status));
    }

    let mut feed = parser
        .parse(&response.body)
        .map_err(|e| CacheError::Parse(e.to_string()))?;

    if feed.feed_link.is_empty() {
        feed.feed_link = url.to_owned();
    }

    Ok(Arc::new(feed))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "population panicked".to_string()
    }
}

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<String, Slot>> {
    // The map holds no invariants a panicking holder could break mid-update
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
