//! Alias records: one `alias NAME='command'` line per name.

use super::{append_record, is_blank, is_valid_name, leading_token, split_lines, strip_eol};

const KEYWORD: &str = "alias";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    pub name: String,
    pub command: String,
}

impl AliasEntry {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }

    /// Serialized record line, newline-terminated.
    pub fn to_line(&self) -> String {
        format!("{KEYWORD} {}={}\n", self.name, single_quote(&self.command))
    }

    /// Parses a record line; `None` for blanks, comments and other text.
    pub fn parse(line: &str) -> Option<Self> {
        let (name, value) = split_record(strip_eol(line))?;
        let command = shell_unquote(value).unwrap_or_else(|| value.to_string());
        Some(Self::new(name, command))
    }
}

/// Splits `alias NAME=VALUE` into its name and raw value. The name is
/// compared as a whole token, never as a pattern.
pub(crate) fn split_record(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim_start().strip_prefix(KEYWORD)?;
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let rest = rest.trim_start();
    let rest = rest.strip_prefix("-- ").unwrap_or(rest);
    let (name, tail) = leading_token(rest);
    let value = tail.strip_prefix('=')?;
    if !is_valid_name(name) {
        return None;
    }
    Some((name, value))
}

/// Name declared by `line`, if it is an alias record.
pub fn record_name(line: &str) -> Option<&str> {
    split_record(strip_eol(line)).map(|(name, _)| name)
}

/// Index of the first line declaring `name`.
pub fn find(content: &str, name: &str) -> Option<usize> {
    split_lines(content)
        .iter()
        .position(|line| record_name(line) == Some(name))
}

pub fn get(content: &str, name: &str) -> Option<(AliasEntry, String)> {
    let lines = split_lines(content);
    let idx = find(content, name)?;
    let raw = lines[idx];
    AliasEntry::parse(raw).map(|entry| (entry, strip_eol(raw).to_string()))
}

/// Names in encounter order, first occurrence only.
pub fn names(content: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in split_lines(content) {
        if let Some(name) = record_name(line) {
            if !out.iter().any(|seen| seen == name) {
                out.push(name.to_string());
            }
        }
    }
    out
}

/// Content with every line declaring `name` excluded, or `None` when no
/// such line exists.
pub fn remove(content: &str, name: &str) -> Option<String> {
    let lines = split_lines(content);
    let mut removed = false;
    let mut out = String::with_capacity(content.len());
    for line in lines {
        if record_name(line) == Some(name) {
            removed = true;
            continue;
        }
        out.push_str(line);
    }
    removed.then_some(out)
}

pub fn append(content: &str, entry: &AliasEntry) -> String {
    append_record(content, &entry.to_line(), "")
}

/// `true` when the line needs no validation (blank or a comment).
pub(crate) fn is_inert(line: &str) -> bool {
    is_blank(line) || line.trim_start().starts_with('#')
}

/// Wraps `text` in single quotes, closing and re-opening around each embedded
/// quote: `it's` becomes `'it'\''s'`.
pub fn single_quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

/// Reverses shell quoting of a single word. Returns `None` when a quote is
/// left open.
pub fn shell_unquote(word: &str) -> Option<String> {
    let mut out = String::with_capacity(word.len());
    let mut chars = word.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' => loop {
                match chars.next()? {
                    '\'' => break,
                    c => out.push(c),
                }
            },
            '"' => loop {
                match chars.next()? {
                    '"' => break,
                    '\\' => {
                        let next = chars.next()?;
                        if !matches!(next, '"' | '\\' | '$' | '`') {
                            out.push('\\');
                        }
                        out.push(next);
                    }
                    c => out.push(c),
                }
            },
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            c => out.push(c),
        }
    }
    Some(out)
}
