//! Minimal tag and attribute scanning for feed autodiscovery and item descriptions.
//!
//! Uses plain string scanning rather than a full HTML parser. Tag and attribute
//! names are matched case-insensitively; attribute values keep their original case.

use std::borrow::Cow;

/// Iterates over the raw text of every `<tag ...>` opening tag in `html`.
///
/// `tag` must be lowercase. Yields slices of the original (case-preserved) input.
pub fn opening_tags<'a>(html: &'a str, tag: &str) -> Vec<&'a str> {
    let html_lower = html.to_ascii_lowercase();
    let needle = format!("<{tag}");
    let mut tags = Vec::new();
    let mut search_from = 0;

    while let Some(found) = html_lower[search_from..].find(&needle) {
        let abs_start = search_from + found;
        let after_name = abs_start + needle.len();

        // `<linkfoo` is a different element
        let boundary_ok = html_lower[after_name..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_whitespace() || c == '>' || c == '/');

        let Some(tag_end) = html_lower[abs_start..].find('>') else {
            break;
        };

        if boundary_ok {
            tags.push(&html[abs_start..=abs_start + tag_end]);
        }
        search_from = abs_start + tag_end + 1;
    }

    tags
}

/// Extracts the raw value of an attribute from a tag string.
///
/// Accepts double-quoted, single-quoted and unquoted values; an unquoted value
/// ends at whitespace or `>`. Entities are left encoded, see [`decode_entities`].
pub fn attr_value<'a>(tag: &'a str, attr_name: &str) -> Option<&'a str> {
    let tag_lower = tag.to_ascii_lowercase();
    let attr_prefix = format!("{attr_name}=");
    let mut search_from = 0;

    // Skip matches that are a suffix of a longer attribute name (e.g. `data-href=`)
    let attr_start = loop {
        let pos = search_from + tag_lower[search_from..].find(&attr_prefix)?;
        let preceded_by_space = tag_lower[..pos]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_whitespace());
        if preceded_by_space {
            break pos;
        }
        search_from = pos + attr_prefix.len();
    };

    let rest = &tag[attr_start + attr_prefix.len()..];
    match rest.chars().next()? {
        quote @ ('"' | '\'') => {
            let inner = &rest[1..];
            let end = inner.find(quote)?;
            Some(&inner[..end])
        }
        _ => {
            let end = rest
                .find(|c: char| c.is_ascii_whitespace() || c == '>')
                .unwrap_or(rest.len());
            Some(&rest[..end]).filter(|value| !value.is_empty())
        }
    }
}

/// Decodes the character references that commonly appear in attribute values.
///
/// Handles `&amp;`, `&quot;`, `&apos;`, `&lt;`, `&gt;` and numeric references;
/// anything else is kept verbatim.
pub fn decode_entities(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }

    let mut decoded = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let reference = rest
            .find(';')
            .map(|semi| (&rest[1..semi], semi))
            .and_then(|(name, semi)| decode_reference(name).map(|c| (c, semi)));
        match reference {
            Some((c, semi)) => {
                decoded.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                decoded.push('&');
                rest = &rest[1..];
            }
        }
    }
    decoded.push_str(rest);

    Cow::Owned(decoded)
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "lt" => Some('<'),
        "gt" => Some('>'),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Returns the `href` of `text` when the whole of `text` is exactly one anchor element.
///
/// Leading and trailing whitespace is ignored. Any other markup or text outside the
/// anchor, or a second anchor inside it, yields `None`.
pub fn sole_anchor_href(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let lower = trimmed.to_ascii_lowercase();

    if !lower.starts_with("<a") || !lower.ends_with("</a>") {
        return None;
    }
    if lower.matches("<a").count() != 1 || lower.matches("</a>").count() != 1 {
        return None;
    }

    let open_end = trimmed.find('>')?;
    attr_value(&trimmed[..=open_end], "href")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_tags_finds_all_links() {
        let html = r#"<head><LINK rel="a"><link rel="b"/><linkx></head>"#;
        let tags = opening_tags(html, "link");
        assert_eq!(tags, vec![r#"<LINK rel="a">"#, r#"<link rel="b"/>"#]);
    }

    #[test]
    fn test_attr_value_quotes() {
        assert_eq!(attr_value(r#"<link href="/a">"#, "href"), Some("/a"));
        assert_eq!(attr_value("<link href='/b'>", "href"), Some("/b"));
    }

    #[test]
    fn test_attr_value_unquoted() {
        let tag = "<link rel=alternate type=application/rss+xml href=/index.xml>";
        assert_eq!(attr_value(tag, "rel"), Some("alternate"));
        assert_eq!(attr_value(tag, "type"), Some("application/rss+xml"));
        assert_eq!(attr_value(tag, "href"), Some("/index.xml"));
        assert_eq!(attr_value("<link href=>", "href"), None);
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(
            decode_entities("/feed?cat=go&amp;format=rss"),
            "/feed?cat=go&format=rss"
        );
        assert_eq!(decode_entities("&#47;a&#x2F;b"), "/a/b");
        assert_eq!(decode_entities("a & b &bogus; c"), "a & b &bogus; c");
        assert!(matches!(decode_entities("/plain"), Cow::Borrowed("/plain")));
    }

    #[test]
    fn test_attr_value_preserves_case() {
        assert_eq!(
            attr_value(r#"<link HREF="/Feed.XML">"#, "href"),
            Some("/Feed.XML")
        );
    }

    #[test]
    fn test_attr_value_skips_prefixed_names() {
        let tag = r#"<link data-href="/wrong" href="/right">"#;
        assert_eq!(attr_value(tag, "href"), Some("/right"));
    }

    #[test]
    fn test_sole_anchor_href() {
        let text = r#" <a href="https://stacker.news/items/131533">Comments</a> "#;
        assert_eq!(
            sole_anchor_href(text),
            Some("https://stacker.news/items/131533")
        );
    }

    #[test]
    fn test_sole_anchor_rejects_surrounding_text() {
        assert_eq!(sole_anchor_href(r#"See <a href="/x">here</a>"#), None);
        assert_eq!(
            sole_anchor_href(r#"<a href="/x">one</a> and <a href="/y">two</a>"#),
            None
        );
        assert_eq!(sole_anchor_href("plain text"), None);
    }
}
