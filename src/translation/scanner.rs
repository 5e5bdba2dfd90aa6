//! Byte-level helpers for the placeholder rewriter.

#[derive(Clone)]
pub(super) enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// Digits starting at `start`, returned with the index just past them.
pub(super) fn scan_digits(bytes: &[u8], start: usize) -> Option<(usize, &str)> {
    let end = start + bytes.get(start..)?.iter().take_while(|b| b.is_ascii_digit()).count();
    if end == start {
        return None;
    }
    std::str::from_utf8(&bytes[start..end])
        .ok()
        .map(|digits| (end, digits))
}

/// An identifier (`[A-Za-z_][A-Za-z0-9_]*`) starting at `start`.
pub(super) fn scan_identifier(bytes: &[u8], start: usize) -> Option<(usize, &str)> {
    let first = *bytes.get(start)?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let end = start
        + bytes[start..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
            .count();
    std::str::from_utf8(&bytes[start..end])
        .ok()
        .map(|name| (end, name))
}

pub(super) fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes[idx..].starts_with(b"--")
}

pub(super) fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes[idx..].starts_with(b"/*")
}

pub(super) fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes[idx..].starts_with(b"*/")
}

/// Recognise an opening `$tag$`; returns the tag and the index of its closing `$`.
pub(super) fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let tag_len = bytes[start + 1..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();
    let closing = start + 1 + tag_len;
    if bytes.get(closing) != Some(&b'$') {
        return None;
    }
    // `$1$` is not a tag: tags cannot start with a digit.
    if bytes.get(start + 1).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    let tag = String::from_utf8(bytes[start + 1..closing].to_vec()).ok()?;
    Some((tag, closing))
}

/// Whether the `$` at `idx` begins the closing `$tag$`.
pub(super) fn matches_tag(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    bytes.get(idx + 1..end) == Some(tag.as_bytes()) && bytes.get(end) == Some(&b'$')
}
