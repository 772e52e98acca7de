//! Feed discovery, fetching, parsing and caching.
//!
//! # Architecture
//!
//! - [`fetch`] - the HTTP fetch capability ([`Fetcher`]) and its `reqwest` implementation
//! - [`discovery`] - content negotiation and HTML autodiscovery ([`FeedNegotiator`])
//! - [`parser`] - RSS/Atom/JSON Feed parsing via `feed-rs` ([`FeedParser`])
//! - [`cache`] - the single-flight parse cache ([`FeedCache`])
//!
//! # Example
//!
//! ```ignore
//! let fetcher = Arc::new(HttpFetcher::new(DEFAULT_MAX_BODY_SIZE)?);
//! let negotiator = FeedNegotiator::new(fetcher.clone(), options, UrlPolicy::default());
//! let cache = FeedCache::new(fetcher, Arc::new(FeedRsParser), options);
//!
//! if let Some(canonical) = negotiator.get_feed_url("https://golangweekly.com/").await {
//!     let feed = cache.resolve_feed(&canonical).await?;
//! }
//! ```

pub mod cache;
pub mod discovery;
pub mod fetch;
pub mod parser;

pub use cache::{CacheEntry, CacheError, FeedCache};
pub use discovery::{classify_content_type, find_feed_link_in_html, ContentClass, FeedNegotiator};
pub use fetch::{
    FetchError, FetchOptions, FetchResponse, Fetcher, HttpFetcher, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_MAX_BODY_SIZE,
};
pub use parser::{parse_feed, FeedItem, FeedParser, FeedRsParser, ParseError, ParsedFeed};

/// A requested URL paired with the canonical feed URL discovery resolved it to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub requested_url: String,
    /// Cache key and identity-derivation input.
    pub canonical_feed_url: String,
}
