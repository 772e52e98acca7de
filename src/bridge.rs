//! The feed-to-events pipeline.
//!
//! [`Bridge`] owns one negotiator, one parse cache and (optionally) the feed
//! store, and turns a user-supplied URL into a profile event plus one note per
//! feed item.

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use thiserror::Error;

use crate::events::{
    build_note_event, build_profile_event, note_timestamp, MessageEvent, ProfileEvent,
};
use crate::feed::{
    CacheError, FeedCache, FeedNegotiator, FeedRsParser, FeedSource, FetchOptions, Fetcher,
    ParsedFeed,
};
use crate::identity::{self, Identity, IdentityError};
use crate::storage::{delete_invalid_feed, Database};
use crate::util::UrlPolicy;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Discovery found no feed behind the URL
    #[error("No feed found at {0}")]
    NoFeed(String),

    #[error("Feed unavailable: {0}")]
    Feed(#[from] CacheError),

    #[error("Identity derivation failed: {0}")]
    Identity(#[from] IdentityError),

    #[error("Failed to encode profile: {0}")]
    Encode(#[from] serde_json::Error),

    /// The operation needs the feed store but none is attached
    #[error("No feed store configured")]
    NoStore,

    #[error("No feed registered for public key {0}")]
    UnknownPublicKey(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Values every generated event depends on.
pub struct BridgeSettings {
    pub secret: SecretString,
    pub default_picture_url: String,
    pub auto_register: bool,
}

impl std::fmt::Debug for BridgeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSettings")
            .field("secret", &"[REDACTED]")
            .field("default_picture_url", &self.default_picture_url)
            .field("auto_register", &self.auto_register)
            .finish()
    }
}

/// A feed recorded in the store.
#[derive(Debug, Clone)]
pub struct RegisteredFeed {
    pub source: FeedSource,
    pub public_key: String,
    pub profile: ProfileEvent,
}

/// Everything generated for one feed.
#[derive(Debug, Clone)]
pub struct FeedEvents {
    pub source: FeedSource,
    pub public_key: String,
    pub profile: ProfileEvent,
    /// One note per item, in feed order.
    pub notes: Vec<MessageEvent>,
}

pub struct Bridge<F> {
    negotiator: FeedNegotiator<F>,
    cache: FeedCache<F, FeedRsParser>,
    policy: UrlPolicy,
    store: Option<Database>,
    settings: BridgeSettings,
}

impl<F: Fetcher> Bridge<F> {
    pub fn new(
        fetcher: Arc<F>,
        options: FetchOptions,
        policy: UrlPolicy,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            negotiator: FeedNegotiator::new(Arc::clone(&fetcher), options, policy),
            cache: FeedCache::new(fetcher, Arc::new(FeedRsParser), options),
            policy,
            store: None,
            settings,
        }
    }

    /// Attaches the feed store used by [`register`](Self::register) and
    /// [`refresh`](Self::refresh).
    pub fn with_store(mut self, store: Database) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(&self) -> &FeedCache<F, FeedRsParser> {
        &self.cache
    }

    /// Negotiates `raw_url` to its canonical feed URL.
    ///
    /// A discovered feed URL that the URL policy rejects counts as no feed.
    pub async fn resolve_source(&self, raw_url: &str) -> Option<FeedSource> {
        let requested_url = raw_url.trim();
        let canonical_feed_url = self.negotiator.get_feed_url(requested_url).await?;

        if let Err(e) = self.policy.check(&canonical_feed_url) {
            tracing::warn!(
                url = %requested_url,
                feed_url = %canonical_feed_url,
                error = %e,
                "Discovered feed URL rejected"
            );
            return None;
        }

        tracing::debug!(url = %requested_url, feed_url = %canonical_feed_url, "Resolved feed source");
        Some(FeedSource {
            requested_url: requested_url.to_owned(),
            canonical_feed_url,
        })
    }

    /// Discovers, parses and records the feed behind `raw_url`.
    ///
    /// # Errors
    ///
    /// Fails when no store is attached, no feed is found, the feed cannot be
    /// fetched or parsed, or the store write fails.
    pub async fn register(&self, raw_url: &str) -> Result<RegisteredFeed, BridgeError> {
        let store = self.store.as_ref().ok_or(BridgeError::NoStore)?;
        let source = self
            .resolve_source(raw_url)
            .await
            .ok_or_else(|| BridgeError::NoFeed(raw_url.to_owned()))?;

        let feed = self.cache.resolve_feed(&source.canonical_feed_url).await?;
        let identity = self.identity_for(&source.canonical_feed_url)?;
        let public_key = identity.public_key_hex();

        store
            .upsert_feed(&public_key, &source.canonical_feed_url)
            .await?;
        tracing::info!(
            feed_url = %source.canonical_feed_url,
            public_key = %public_key,
            "Registered feed"
        );

        let profile = self.profile_event(&public_key, &feed, &source)?;
        Ok(RegisteredFeed {
            source,
            public_key,
            profile,
        })
    }

    /// Builds the profile and note events for the feed behind `raw_url`.
    ///
    /// # Errors
    ///
    /// Fails when no feed is found or the feed cannot be fetched or parsed.
    pub async fn events_for(&self, raw_url: &str) -> Result<FeedEvents, BridgeError> {
        let source = self
            .resolve_source(raw_url)
            .await
            .ok_or_else(|| BridgeError::NoFeed(raw_url.to_owned()))?;
        self.build_events(source).await
    }

    /// Rebuilds events for a registered feed from a fresh fetch.
    ///
    /// A stored feed that no longer parses, or that the server reports as gone
    /// (404/410), is removed from the store before the error is returned.
    ///
    /// # Errors
    ///
    /// Fails when no store is attached, the key is unknown, or the feed cannot
    /// be fetched or parsed.
    pub async fn refresh(&self, public_key: &str) -> Result<FeedEvents, BridgeError> {
        let store = self.store.as_ref().ok_or(BridgeError::NoStore)?;
        let url = store
            .feed_url_for(public_key)
            .await?
            .ok_or_else(|| BridgeError::UnknownPublicKey(public_key.to_owned()))?;

        self.cache.invalidate(&url);
        let source = FeedSource {
            requested_url: url.clone(),
            canonical_feed_url: url.clone(),
        };

        match self.build_events(source).await {
            Err(BridgeError::Feed(error)) if is_permanent_feed_failure(&error) => {
                tracing::warn!(public_key = %public_key, error = %error, "Stored feed is no longer valid");
                delete_invalid_feed(store, &url).await;
                Err(BridgeError::Feed(error))
            }
            other => other,
        }
    }

    async fn build_events(&self, source: FeedSource) -> Result<FeedEvents, BridgeError> {
        let feed = self.cache.resolve_feed(&source.canonical_feed_url).await?;
        let identity = self.identity_for(&source.canonical_feed_url)?;
        let public_key = identity.public_key_hex();

        let profile = self.profile_event(&public_key, &feed, &source)?;

        let now = Utc::now();
        let notes = feed
            .items
            .iter()
            .map(|item| {
                build_note_event(
                    &public_key,
                    item,
                    &feed,
                    note_timestamp(item, now),
                    &source.requested_url,
                )
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            feed_url = %source.canonical_feed_url,
            notes = notes.len(),
            "Built feed events"
        );
        Ok(FeedEvents {
            source,
            public_key,
            profile,
            notes,
        })
    }

    fn identity_for(&self, canonical_feed_url: &str) -> Result<Identity, IdentityError> {
        identity::derive(canonical_feed_url, self.settings.secret.expose_secret())
    }

    fn profile_event(
        &self,
        public_key: &str,
        feed: &ParsedFeed,
        source: &FeedSource,
    ) -> Result<ProfileEvent, serde_json::Error> {
        build_profile_event(
            public_key,
            feed,
            &source.requested_url,
            self.settings.auto_register,
            &self.settings.default_picture_url,
        )
    }
}

/// Failures that will not heal on retry: the document is not a feed, or the
/// server says it no longer exists. Network errors and 5xx are transient.
fn is_permanent_feed_failure(error: &CacheError) -> bool {
    matches!(
        error,
        CacheError::Parse(_) | CacheError::HttpStatus(404 | 410)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{KIND_METADATA, KIND_TEXT_NOTE};
    use crate::feed::{FetchError, FetchResponse};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const SECRET: &str = "test";

    const GOLANG_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Golang Weekly</title>
    <link>https://golangweekly.com/</link>
    <description>A weekly newsletter about the Go programming language</description>
    <item>
        <guid>https://golangweekly.com/issues/446</guid>
        <title>Issue 446</title>
        <link>https://golangweekly.com/issues/446</link>
        <description>Short</description>
        <pubDate>Sun, 05 Feb 2023 08:00:00 +0000</pubDate>
    </item>
    <item>
        <guid isPermaLink="false">issue-445</guid>
        <title>Issue 445</title>
    </item>
</channel></rss>"#;

    /// Serves canned responses keyed by URL; unknown URLs are 404.
    #[derive(Default)]
    struct RoutedFetcher {
        routes: Mutex<HashMap<String, (u16, &'static str, String)>>,
    }

    impl RoutedFetcher {
        fn route(&self, url: &str, content_type: &'static str, body: &str) {
            self.route_status(url, 200, content_type, body);
        }

        fn route_status(&self, url: &str, status: u16, content_type: &'static str, body: &str) {
            self.routes
                .lock()
                .unwrap()
                .insert(url.to_owned(), (status, content_type, body.to_owned()));
        }
    }

    impl Fetcher for RoutedFetcher {
        async fn fetch(&self, url: &str, _options: FetchOptions) -> Result<FetchResponse, FetchError> {
            let route = self.routes.lock().unwrap().get(url).cloned();
            Ok(match route {
                Some((status, content_type, body)) => FetchResponse {
                    status,
                    content_type: content_type.to_owned(),
                    body: body.into_bytes(),
                    final_url: url.to_owned(),
                },
                None => FetchResponse {
                    status: 404,
                    content_type: String::new(),
                    body: Vec::new(),
                    final_url: url.to_owned(),
                },
            })
        }
    }

    fn settings() -> BridgeSettings {
        BridgeSettings {
            secret: SecretString::from(SECRET.to_owned()),
            default_picture_url: "https://image.example".to_owned(),
            auto_register: true,
        }
    }

    fn bridge(fetcher: &Arc<RoutedFetcher>) -> Bridge<RoutedFetcher> {
        Bridge::new(
            Arc::clone(fetcher),
            FetchOptions::default(),
            UrlPolicy::default(),
            settings(),
        )
    }

    async fn bridge_with_store(fetcher: &Arc<RoutedFetcher>) -> (Bridge<RoutedFetcher>, Database) {
        let db = Database::open(":memory:").await.unwrap();
        (bridge(fetcher).with_store(db.clone()), db)
    }

    fn golang_fetcher() -> Arc<RoutedFetcher> {
        let fetcher = Arc::new(RoutedFetcher::default());
        fetcher.route(
            "https://golangweekly.com/",
            "text/html; charset=utf-8",
            r#"<html><head><link rel="alternate" type="application/rss+xml" href="/rss"></head></html>"#,
        );
        fetcher.route("https://golangweekly.com/rss", "application/rss+xml", GOLANG_RSS);
        fetcher
    }

    #[tokio::test]
    async fn test_resolve_source_through_html() {
        let fetcher = golang_fetcher();
        let source = bridge(&fetcher)
            .resolve_source(" https://golangweekly.com/ ")
            .await
            .unwrap();

        assert_eq!(source.requested_url, "https://golangweekly.com/");
        assert_eq!(source.canonical_feed_url, "https://golangweekly.com/rss");
    }

    #[tokio::test]
    async fn test_discovered_private_feed_url_rejected() {
        let fetcher = Arc::new(RoutedFetcher::default());
        fetcher.route(
            "https://blog.example/",
            "text/html",
            r#"<link rel="alternate" type="application/atom+xml" href="http://127.0.0.1/feed">"#,
        );

        assert!(bridge(&fetcher)
            .resolve_source("https://blog.example/")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_events_for_builds_profile_and_notes() {
        let fetcher = golang_fetcher();
        let events = bridge(&fetcher)
            .events_for("https://golangweekly.com/")
            .await
            .unwrap();

        let expected_key = identity::derive("https://golangweekly.com/rss", SECRET)
            .unwrap()
            .public_key_hex();
        assert_eq!(events.public_key, expected_key);
        assert_eq!(events.profile.event.kind, KIND_METADATA);
        assert_eq!(events.profile.event.pubkey, expected_key);
        assert!(events.profile.auto_register);

        assert_eq!(events.notes.len(), 2);
        assert!(events.notes.iter().all(|n| n.kind == KIND_TEXT_NOTE));
        assert_eq!(events.notes[0].created_at.timestamp(), 1675584000);
        assert_eq!(
            events.notes[0].content,
            "**Issue 446**\n\nShort\n\nhttps://golangweekly.com/issues/446"
        );
        // No link: the note points at the URL the caller asked for
        assert_eq!(
            events.notes[1].content,
            "**Issue 445**\n\nhttps://golangweekly.com/"
        );
    }

    #[tokio::test]
    async fn test_events_for_unknown_site() {
        let fetcher = Arc::new(RoutedFetcher::default());
        let result = bridge(&fetcher).events_for("https://nothing.example/").await;
        assert!(matches!(result, Err(BridgeError::NoFeed(_))));
    }

    #[tokio::test]
    async fn test_register_requires_store() {
        let fetcher = golang_fetcher();
        let result = bridge(&fetcher).register("https://golangweekly.com/").await;
        assert!(matches!(result, Err(BridgeError::NoStore)));
    }

    #[tokio::test]
    async fn test_register_then_refresh() {
        let fetcher = golang_fetcher();
        let (bridge, db) = bridge_with_store(&fetcher).await;

        let registered = bridge.register("https://golangweekly.com/").await.unwrap();
        assert_eq!(
            db.feed_url_for(&registered.public_key).await.unwrap().as_deref(),
            Some("https://golangweekly.com/rss")
        );

        let events = bridge.refresh(&registered.public_key).await.unwrap();
        assert_eq!(events.public_key, registered.public_key);
        assert_eq!(events.notes.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_unknown_key() {
        let fetcher = golang_fetcher();
        let (bridge, _db) = bridge_with_store(&fetcher).await;
        let result = bridge.refresh("00").await;
        assert!(matches!(result, Err(BridgeError::UnknownPublicKey(_))));
    }

    #[tokio::test]
    async fn test_refresh_removes_feed_that_stopped_parsing() {
        let fetcher = golang_fetcher();
        let (bridge, db) = bridge_with_store(&fetcher).await;
        let registered = bridge.register("https://golangweekly.com/").await.unwrap();

        fetcher.route("https://golangweekly.com/rss", "text/html", "<html>moved</html>");

        let result = bridge.refresh(&registered.public_key).await;
        assert!(matches!(result, Err(BridgeError::Feed(CacheError::Parse(_)))));
        assert!(db.list_feeds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_removes_feed_that_is_gone() {
        for status in [404, 410] {
            let fetcher = golang_fetcher();
            let (bridge, db) = bridge_with_store(&fetcher).await;
            let registered = bridge.register("https://golangweekly.com/").await.unwrap();

            fetcher.route_status("https://golangweekly.com/rss", status, "text/html", "");

            let result = bridge.refresh(&registered.public_key).await;
            assert!(
                matches!(result, Err(BridgeError::Feed(CacheError::HttpStatus(s))) if s == status)
            );
            assert!(db.list_feeds().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_refresh_keeps_feed_on_server_error() {
        let fetcher = golang_fetcher();
        let (bridge, db) = bridge_with_store(&fetcher).await;
        let registered = bridge.register("https://golangweekly.com/").await.unwrap();

        fetcher.route_status("https://golangweekly.com/rss", 503, "text/html", "");

        let result = bridge.refresh(&registered.public_key).await;
        assert!(matches!(result, Err(BridgeError::Feed(CacheError::HttpStatus(503)))));
        assert_eq!(db.list_feeds().await.unwrap().len(), 1);
    }

    #[test]
    fn test_settings_debug_redacts_secret() {
        let debug_output = format!("{:?}", settings());
        assert!(!debug_output.contains("\"test\""));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
