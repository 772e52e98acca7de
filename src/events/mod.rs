//! Unsigned message records built from feeds and their items.
//!
//! Signing and publishing happen downstream; every record leaves here with an
//! empty `sig` and no tags.

mod format;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::{FeedItem, ParsedFeed};

pub use format::{classify, format_content, ItemKind, MAX_BODY_CHARS};

/// Profile/metadata record kind.
pub const KIND_METADATA: u32 = 0;
/// Short text note kind.
pub const KIND_TEXT_NOTE: u32 = 1;

/// An unsigned protocol event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Author public key (hex).
    pub pubkey: String,
    pub kind: u32,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// Always empty until the caller signs the event.
    pub sig: String,
}

impl MessageEvent {
    fn unsigned(pubkey: &str, kind: u32, created_at: DateTime<Utc>, content: String) -> Self {
        Self {
            pubkey: pubkey.to_owned(),
            kind,
            created_at,
            tags: Vec::new(),
            content,
            sig: String::new(),
        }
    }
}

/// Profile document carried in a kind-0 event's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub name: String,
    pub about: String,
    pub picture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// A kind-0 event plus whether the caller may publish it as a new identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileEvent {
    pub event: MessageEvent,
    pub auto_register: bool,
}

/// Builds the profile record for a feed's identity.
///
/// The record is always built; `auto_register` only travels with it. Feeds
/// without an image get `default_picture_url`.
///
/// # Errors
///
/// Returns an error only if the profile document cannot be serialized.
pub fn build_profile_event(
    pubkey: &str,
    feed: &ParsedFeed,
    original_url: &str,
    auto_register: bool,
    default_picture_url: &str,
) -> Result<ProfileEvent, serde_json::Error> {
    let website = [feed.link.trim(), original_url.trim()]
        .into_iter()
        .find(|link| !link.is_empty())
        .map(str::to_owned);

    let name = match feed.title.trim() {
        "" => original_url.to_owned(),
        title => title.to_owned(),
    };

    let about = [feed.description.trim(), website.as_deref().unwrap_or("")]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let picture = feed
        .image_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(default_picture_url)
        .to_owned();

    let metadata = ProfileMetadata {
        name,
        about,
        picture,
        website,
    };
    let content = serde_json::to_string(&metadata)?;

    Ok(ProfileEvent {
        event: MessageEvent::unsigned(pubkey, KIND_METADATA, Utc::now(), content),
        auto_register,
    })
}

/// Builds the text note for one feed item.
///
/// `created_at` is used exactly as given; see [`note_timestamp`] for the usual
/// choice. Items without a link point at `original_url` instead.
pub fn build_note_event(
    pubkey: &str,
    item: &FeedItem,
    feed: &ParsedFeed,
    created_at: DateTime<Utc>,
    original_url: &str,
) -> MessageEvent {
    let link = match item.link.trim() {
        "" => original_url,
        link => link,
    };
    let content = format::format_with_link(item, feed, link);

    MessageEvent::unsigned(pubkey, KIND_TEXT_NOTE, created_at, content)
}

/// Item publish time, then update time, then `fallback`.
pub fn note_timestamp(item: &FeedItem, fallback: DateTime<Utc>) -> DateTime<Utc> {
    item.published_at.or(item.updated_at).unwrap_or(fallback)
}
