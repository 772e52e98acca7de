use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::util::strip_control_chars;

/// Extension key holding the item's content originator (`dc:creator`).
pub const ATTRIBUTION_KEY: &str = "dc:creator";
/// Extension key holding the item's external discussion link (`<comments>`).
pub const COMMENTS_KEY: &str = "comments";

/// Errors produced while turning a response body into a [`ParsedFeed`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not a recognisable RSS, Atom or JSON feed.
    #[error("Invalid feed document: {0}")]
    InvalidDocument(String),
}

/// Feed-level metadata plus the ordered items of a feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub title: String,
    pub description: String,
    /// Website the feed belongs to.
    pub link: String,
    /// URL of the feed document itself.
    pub feed_link: String,
    pub language: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub items: Vec<FeedItem>,
}

/// A single entry of a feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub description: String,
    pub content: String,
    pub link: String,
    pub guid: String,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Loosely-typed side fields that feed-rs does not model, keyed by element name.
    pub extensions: BTreeMap<String, String>,
}

impl FeedItem {
    /// Content originator, when the feed names one.
    pub fn attribution(&self) -> Option<&str> {
        self.extension(ATTRIBUTION_KEY)
    }

    /// External discussion link, when the feed carries one.
    pub fn comments(&self) -> Option<&str> {
        self.extension(COMMENTS_KEY)
    }

    fn extension(&self, key: &str) -> Option<&str> {
        self.extensions
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Feed parser capability consumed by the parse cache.
pub trait FeedParser: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`ParseError`] if `body` is not a feed document.
    fn parse(&self, body: &[u8]) -> Result<ParsedFeed, ParseError>;
}

/// [`FeedParser`] built on `feed-rs`, with a `quick-xml` pass for RSS extension fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedRsParser;

impl FeedParser for FeedRsParser {
    fn parse(&self, body: &[u8]) -> Result<ParsedFeed, ParseError> {
        parse_feed(body)
    }
}

/// Parses RSS, Atom or JSON Feed bytes into a [`ParsedFeed`].
///
/// # Errors
///
/// Returns [`ParseError::InvalidDocument`] when `feed-rs` rejects the body.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    let feed =
        feed_rs::parser::parse(bytes).map_err(|e| ParseError::InvalidDocument(e.to_string()))?;

    let mut extensions = scan_item_extensions(bytes);
    if !extensions.is_empty() && extensions.len() != feed.entries.len() {
        tracing::debug!(
            scanned = extensions.len(),
            entries = feed.entries.len(),
            "Item extension count mismatch, ignoring extensions"
        );
        extensions.clear();
    }
    let mut extensions = extensions.into_iter();

    let feed_link = feed
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("self"))
        .map(|l| l.href.clone())
        .unwrap_or_default();
    let link = feed
        .links
        .iter()
        .find(|l| l.rel.as_deref() != Some("self"))
        .map(|l| l.href.clone())
        .unwrap_or_default();

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .iter()
                .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
                .or_else(|| entry.links.first())
                .map(|l| l.href.clone())
                .unwrap_or_default();

            FeedItem {
                title: clean(entry.title.map(|t| t.content)),
                description: clean(entry.summary.map(|s| s.content)),
                content: clean(entry.content.and_then(|c| c.body)),
                link,
                guid: entry.id.trim().to_owned(),
                published_at: entry.published,
                updated_at: entry.updated,
                extensions: extensions.next().unwrap_or_default(),
            }
        })
        .collect();

    Ok(ParsedFeed {
        title: clean(feed.title.map(|t| t.content)),
        description: clean(feed.description.map(|d| d.content)),
        link,
        feed_link,
        language: feed.language,
        published_at: feed.published.or(feed.updated),
        image_url: feed.logo.or(feed.icon).map(|image| image.uri),
        items,
    })
}

fn clean(text: Option<String>) -> String {
    text.map(|t| strip_control_chars(t.trim()).into_owned())
        .unwrap_or_default()
}

/// Collects the extension elements of each RSS `<item>` in document order.
///
/// Best effort: malformed XML or a non-XML body (JSON Feed) yields whatever was
/// collected so far.
fn scan_item_extensions(bytes: &[u8]) -> Vec<BTreeMap<String, String>> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut items: Vec<BTreeMap<String, String>> = Vec::new();
    let mut buf = Vec::new();
    let mut in_item = false;
    // Extension key being captured and its accumulated text
    let mut capture: Option<(&'static str, String)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"item" => {
                    in_item = true;
                    items.push(BTreeMap::new());
                }
                b"comments" if in_item => capture = Some((COMMENTS_KEY, String::new())),
                b"dc:creator" if in_item => capture = Some((ATTRIBUTION_KEY, String::new())),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Some((_, text)) = capture.as_mut() {
                    match t.unescape() {
                        Ok(s) => text.push_str(&s),
                        Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let Some((_, text)) = capture.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"item" => in_item = false,
                b"comments" | b"dc:creator" => {
                    if let (Some((key, text)), Some(current)) = (capture.take(), items.last_mut())
                    {
                        // First occurrence wins, matching feed readers' single-creator view
                        current.entry(key.to_owned()).or_insert(text);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Stopped extension scan on malformed XML");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    items
}
