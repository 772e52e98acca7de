use std::sync::Arc;

use super::fetch::{FetchOptions, Fetcher};
use crate::util::html::{attr_value, decode_entities, opening_tags};
use crate::util::UrlPolicy;

/// Media types that identify a syndication document.
const FEED_MEDIA_TYPES: &[&str] = &[
    "application/rss+xml",
    "application/atom+xml",
    "application/feed+json",
    "application/rdf+xml",
    "application/xml",
    "text/xml",
];

/// Media types a feed-alternate `<link>` hint may advertise.
const HINT_MEDIA_TYPES: &[&str] = &[
    "application/rss+xml",
    "application/atom+xml",
    "application/feed+json",
];

/// How a fetched response is treated by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    /// The response is itself a feed document.
    Feed,
    /// An HTML page that may advertise a feed.
    Html,
    /// Anything else (JSON documents, images, plain text, ...).
    Unusable,
}

/// Classifies a lowercased `Content-Type` header value.
pub fn classify_content_type(content_type: &str) -> ContentClass {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if FEED_MEDIA_TYPES.contains(&essence.as_str()) {
        ContentClass::Feed
    } else if essence == "text/html" || essence == "application/xhtml+xml" {
        ContentClass::Html
    } else {
        ContentClass::Unusable
    }
}

/// Resolves arbitrary URLs to canonical feed URLs.
///
/// Every failure mode (malformed or disallowed URL, network error, timeout,
/// redirect, unsupported content type, HTML without a feed hint) collapses into
/// `None`; callers only learn whether a feed was found.
pub struct FeedNegotiator<F> {
    fetcher: Arc<F>,
    options: FetchOptions,
    policy: UrlPolicy,
}

impl<F: Fetcher> FeedNegotiator<F> {
    pub fn new(fetcher: Arc<F>, options: FetchOptions, policy: UrlPolicy) -> Self {
        Self {
            fetcher,
            options,
            policy,
        }
    }

    /// Returns the canonical feed URL for `url`, or `None` when no feed is found.
    ///
    /// A URL serving a feed media type is returned unchanged. An HTML page yields
    /// its first feed-alternate hint, resolved against the page URL.
    pub async fn get_feed_url(&self, url: &str) -> Option<String> {
        if let Err(e) = self.policy.check(url) {
            tracing::debug!(url = %url, error = %e, "Rejected URL before discovery");
            return None;
        }

        let response = match self.fetcher.fetch(url, self.options).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Discovery fetch failed");
                return None;
            }
        };

        if response.is_redirect() {
            tracing::debug!(url = %url, status = response.status, "Discovery does not follow redirects");
            return None;
        }
        if !response.is_success() {
            tracing::debug!(url = %url, status = response.status, "Discovery got non-success status");
            return None;
        }

        match classify_content_type(&response.content_type) {
            ContentClass::Feed => Some(url.to_owned()),
            ContentClass::Html => {
                let html = String::from_utf8_lossy(&response.body);
                let found = find_feed_link_in_html(&html, &response.final_url);
                if found.is_none() {
                    tracing::debug!(url = %url, "HTML page advertises no feed");
                }
                found
            }
            ContentClass::Unusable => {
                tracing::debug!(
                    url = %url,
                    content_type = %response.content_type,
                    "Unsupported content type for discovery"
                );
                None
            }
        }
    }
}

/// Scans HTML for `<link>` tags with `rel="alternate"` and a feed media type.
///
/// Handles attribute ordering variations and resolves relative references against
/// `base_url`. Returns the first match in document order.
pub fn find_feed_link_in_html(html: &str, base_url: &str) -> Option<String> {
    opening_tags(html, "link").into_iter().find_map(|tag| {
        let is_alternate = attr_value(tag, "rel").is_some_and(|rel| {
            rel.split_ascii_whitespace()
                .any(|r| r.eq_ignore_ascii_case("alternate"))
        });
        let is_feed = attr_value(tag, "type").is_some_and(|ty| {
            let ty = ty.trim().to_ascii_lowercase();
            HINT_MEDIA_TYPES.contains(&ty.as_str())
        });
        if !(is_alternate && is_feed) {
            return None;
        }

        let href = decode_entities(attr_value(tag, "href")?.trim());
        if href.is_empty() {
            return None;
        }
        resolve_url(&href, base_url)
    })
}

/// Resolves a potentially relative URL against a base URL.
///
/// Absolute `http(s)` references are returned verbatim.
fn resolve_url(href: &str, base_url: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_owned());
    }

    let base = url::Url::parse(base_url).ok()?;
    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}
