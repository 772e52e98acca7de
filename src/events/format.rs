use crate::feed::{FeedItem, ParsedFeed};
use crate::util::html::sole_anchor_href;
use crate::util::{truncate_chars, upgrade_to_https, ELLIPSIS};

/// Rendered headline-plus-description bodies longer than this are cut.
pub const MAX_BODY_CHARS: usize = 249;

/// Title prefix marking a repost of someone else's post.
const REPOST_MARKER: &str = "RT by @";
/// Title prefix marking a reply to another author.
const REPLY_MARKER: &str = "R to @";

/// How an item is rendered, resolved once from its title and extension fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind<'a> {
    /// Quotes another author's post.
    Repost { original_author: &'a str },
    /// Answers another author.
    Reply { addressed_author: &'a str },
    /// Ordinary item that links to an external discussion.
    DefaultWithComments { reference: &'a str },
    Default,
}

/// Classifies `item` for rendering.
///
/// Repost and reply both require an attribution; a marker in the title alone is
/// not enough.
pub fn classify<'a>(item: &'a FeedItem, feed: &'a ParsedFeed) -> ItemKind<'a> {
    if let Some(attribution) = item.attribution() {
        if item.title.starts_with(REPOST_MARKER) {
            return ItemKind::Repost {
                original_author: attribution,
            };
        }
        if item.title.starts_with(REPLY_MARKER) {
            return ItemKind::Reply {
                addressed_author: addressed_author(&item.title, feed),
            };
        }
    }

    match item.comments() {
        Some(reference) => ItemKind::DefaultWithComments { reference },
        None => ItemKind::Default,
    }
}

/// The `@handle` a reply title addresses, e.g. `@coldplay` in `R to @coldplay: hi`.
///
/// Falls back to the feed owner's handle from a `Name / @handle` feed title, then
/// to the feed title itself.
fn addressed_author<'a>(title: &'a str, feed: &'a ParsedFeed) -> &'a str {
    let from_title = title
        .strip_prefix("R to ")
        .and_then(|rest| rest.split_whitespace().next())
        .map(|handle| handle.trim_end_matches(':'))
        .filter(|handle| handle.len() > 1);

    from_title
        .or_else(|| {
            feed.title
                .rsplit(" / ")
                .next()
                .filter(|owner| owner.starts_with('@'))
        })
        .unwrap_or(&feed.title)
}

/// Renders `item` as message body text.
///
/// The stored item is never modified; truncation only shortens the output.
pub fn format_content(item: &FeedItem, feed: &ParsedFeed) -> String {
    format_with_link(item, feed, &item.link)
}

/// [`format_content`] with an explicit link, for items that carry none.
pub(crate) fn format_with_link(item: &FeedItem, feed: &ParsedFeed, link: &str) -> String {
    let description = item.description.trim();

    match classify(item, feed) {
        ItemKind::Repost { original_author } => blocks(&[
            &format!("**RT {original_author}:**"),
            description,
            &upgrade_to_https(link),
        ]),
        ItemKind::Reply { addressed_author } => blocks(&[
            &format!("**Response to {addressed_author}:**"),
            description,
            &upgrade_to_https(link),
        ]),
        ItemKind::DefaultWithComments { reference } => {
            let comments = format!("Comments: {reference}");
            if is_boilerplate(description, reference) {
                return blocks(&[&headline(&item.title), &comments, link]);
            }

            let (body, truncated) = shortened_body(&item.title, description);
            // A cut body runs straight into the comments line
            let separator = if truncated { "\n" } else { "\n\n" };
            blocks(&[&format!("{body}{separator}{comments}"), link])
        }
        ItemKind::Default => {
            let (body, _) = shortened_body(&item.title, description);
            blocks(&[&body, link])
        }
    }
}

/// Whether a description adds nothing beyond the comments line.
///
/// Empty descriptions and a lone anchor to the comments reference qualify; any
/// other text is treated as substantive.
fn is_boilerplate(description: &str, comments_reference: &str) -> bool {
    description.is_empty()
        || sole_anchor_href(description).is_some_and(|href| href.trim() == comments_reference)
}

fn headline(title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        String::new()
    } else {
        format!("**{title}**")
    }
}

/// Bold title and description, cut to [`MAX_BODY_CHARS`] plus an ellipsis.
fn shortened_body(title: &str, description: &str) -> (String, bool) {
    let body = blocks(&[&headline(title), description]);
    match truncate_chars(&body, MAX_BODY_CHARS) {
        Some(prefix) => (format!("{prefix}{ELLIPSIS}"), true),
        None => (body, false),
    }
}

/// Joins the non-empty parts with a blank line.
fn blocks(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n\n")
}
