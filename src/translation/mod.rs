use std::borrow::Cow;

mod scanner;

use scanner::{
    State, is_block_comment_end, is_block_comment_start, is_line_comment_start, matches_tag,
    scan_digits, scan_identifier, try_start_dollar_quote,
};

/// Bind-marker style understood by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL-style placeholders like `$1`.
    Postgres,
    /// SQLite-style placeholders like `?1`.
    Sqlite,
}

impl PlaceholderStyle {
    fn marker(self) -> char {
        match self {
            PlaceholderStyle::Postgres => '$',
            PlaceholderStyle::Sqlite => '?',
        }
    }
}

/// A replacement found by a marker callback: the byte index just past the matched
/// text, and what to write instead of it.
type Replacement = (usize, String);

/// Walk `sql` and let `on_marker` rewrite bytes that sit outside of quoted strings,
/// comments and dollar-quoted bodies. Returns a borrowed `Cow` when nothing changed.
fn rewrite<F>(sql: &str, mut on_marker: F) -> Cow<'_, str>
where
    F: FnMut(&[u8], usize) -> Option<Replacement>,
{
    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    let mut copied_to = 0;
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                _ => {
                    if b == b'$'
                        && let Some((tag, closing)) = try_start_dollar_quote(bytes, idx)
                    {
                        state = State::DollarQuoted(tag);
                        idx = closing;
                    } else if let Some((end, replacement)) = on_marker(bytes, idx) {
                        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len()));
                        buf.push_str(&sql[copied_to..idx]);
                        buf.push_str(&replacement);
                        copied_to = end;
                        idx = end;
                        continue;
                    }
                }
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied_to..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}

/// Translate positional placeholders between Postgres-style `$N` and SQLite-style `?N`.
///
/// Quoted strings, comments and dollar-quoted blocks are skipped by a lightweight state
/// machine; exotic SQL (e.g. PL/pgSQL bodies) is better written per backend.
/// Returns a borrowed `Cow` when no changes are needed.
#[must_use]
pub fn translate_placeholders(sql: &str, target: PlaceholderStyle, enabled: bool) -> Cow<'_, str> {
    if !enabled {
        return Cow::Borrowed(sql);
    }

    let source = match target {
        PlaceholderStyle::Postgres => b'?',
        PlaceholderStyle::Sqlite => b'$',
    };
    rewrite(sql, |bytes, idx| {
        if bytes[idx] != source {
            return None;
        }
        let (end, digits) = scan_digits(bytes, idx + 1)?;
        Some((end, format!("{}{digits}", target.marker())))
    })
}

/// Rewrite named `:name` markers into positional markers of `target` style.
///
/// Returns the rewritten statement together with the distinct names in bind order, so
/// the caller can line up values from a mapping. A name used twice reuses its position.
/// Postgres `::type` casts are left alone.
#[must_use]
pub fn bind_named_placeholders(sql: &str, target: PlaceholderStyle) -> (Cow<'_, str>, Vec<String>) {
    let mut names: Vec<String> = Vec::new();
    let rewritten = rewrite(sql, |bytes, idx| {
        if bytes[idx] != b':' {
            return None;
        }
        if bytes.get(idx + 1) == Some(&b':') || (idx > 0 && bytes[idx - 1] == b':') {
            return None;
        }
        let (end, name) = scan_identifier(bytes, idx + 1)?;
        let position = match names.iter().position(|known| known == name) {
            Some(existing) => existing + 1,
            None => {
                names.push(name.to_string());
                names.len()
            }
        };
        Some((end, format!("{}{position}", target.marker())))
    });
    (rewritten, names)
}
