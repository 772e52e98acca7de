use std::borrow::Cow;

/// Marker appended to text cut by [`truncate_chars`].
pub const ELLIPSIS: char = '…';

/// Returns the first `max_chars` characters of `s`, or `None` when `s` already fits.
///
/// Counts Unicode scalar values, not bytes or display columns, so the cut never
/// lands inside a multi-byte character.
///
/// # Examples
///
/// ```
/// use rssbridge::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Hello World", 5), Some("Hello"));
/// assert_eq!(truncate_chars("Short", 10), None);
/// assert_eq!(truncate_chars("日本語テキスト", 3), Some("日本語"));
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Option<&str> {
    s.char_indices().nth(max_chars).map(|(idx, _)| &s[..idx])
}

/// Rewrites a leading `http://` scheme to `https://`.
///
/// Only the scheme prefix is touched; `http://` appearing later in the URL (for
/// example inside a query string) is left alone.
pub fn upgrade_to_https(link: &str) -> Cow<'_, str> {
    match link.strip_prefix("http://") {
        Some(rest) => Cow::Owned(format!("https://{rest}")),
        None => Cow::Borrowed(link),
    }
}

/// Strips C0 control characters and DEL from feed-supplied text.
///
/// Tab, newline and carriage return are kept. Returns `Cow::Borrowed` for clean
/// input, which is the common case.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |c: char| c == '\x7f' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'));

    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }

    Cow::Owned(s.chars().filter(|c| !is_control(*c)).collect())
}
