// Line-protocol lexing: escape-aware splitting shared by the parser and the sink encoder.
// Separators are ASCII, so scanning bytes never lands inside a multi-byte UTF-8 sequence.

use std::borrow::Cow;

/// Characters a backslash may escape anywhere in a point.
const ESCAPABLE: &[u8] = b", =\\\"";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    UnterminatedQuote,
}

/// Byte offset of the first `sep` that is not backslash-escaped.
/// When `quotes` is set, separators inside double-quoted runs are skipped too.
pub fn find_unescaped(s: &str, sep: u8, quotes: bool) -> Result<Option<usize>, LexError> {
    let bytes = s.as_bytes();
    let mut in_quotes = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' {
            i += 2;
            continue;
        }
        if quotes && b == b'"' {
            in_quotes = !in_quotes;
        } else if b == sep && !in_quotes {
            return Ok(Some(i));
        }
        i += 1;
    }
    if in_quotes {
        return Err(LexError::UnterminatedQuote);
    }
    Ok(None)
}

/// Splits `s` on every unescaped `sep`; see [`find_unescaped`].
pub fn split_unescaped(s: &str, sep: u8, quotes: bool) -> Result<Vec<&str>, LexError> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(idx) = find_unescaped(rest, sep, quotes)? {
        parts.push(&rest[..idx]);
        rest = &rest[idx + 1..];
    }
    parts.push(rest);
    Ok(parts)
}

/// Splits `s` into the parts before and after the first unescaped `sep`.
pub fn split_once_unescaped(s: &str, sep: u8) -> Option<(&str, &str)> {
    match find_unescaped(s, sep, false) {
        Ok(Some(idx)) => Some((&s[..idx], &s[idx + 1..])),
        _ => None,
    }
}

/// Drops the backslash in front of escapable characters; other backslashes stay literal.
pub fn unescape(s: &str) -> Cow<'_, str> {
    if !s.contains('\\') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(&next) = chars.peek()
            && next.is_ascii()
            && ESCAPABLE.contains(&(next as u8))
        {
            out.push(next);
            chars.next();
            continue;
        }
        out.push(c);
    }
    Cow::Owned(out)
}

fn escape_with<'a>(s: &'a str, special: &[char]) -> Cow<'a, str> {
    if !s.contains(special) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    Cow::Owned(out)
}

/// Escapes a measurement name (backslashes, commas and spaces).
pub fn escape_measurement(s: &str) -> Cow<'_, str> {
    escape_with(s, &['\\', ',', ' '])
}

/// Escapes a tag key, tag value or field key. A trailing backslash must not
/// swallow the following separator, so backslashes are escaped as well.
pub fn escape_tag(s: &str) -> Cow<'_, str> {
    escape_with(s, &['\\', ',', '=', ' '])
}
