//! Line-oriented parsing of the alias and function definition files.
//!
//! Nothing here is a shell grammar. The lexer tracks just enough state
//! (quotes, escapes, comments, brace depth) to find where one named record
//! starts and ends without disturbing the surrounding text.

pub mod alias;
pub mod function;
pub mod lexer;

pub use alias::AliasEntry;
pub use function::{FunctionBlock, FunctionEntry};

/// Identifier rule shared by aliases and functions:
/// a letter or underscore, then letters, digits or underscores.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(is_name_char)
}

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Leading identifier token of `text` (possibly empty).
pub(crate) fn leading_token(text: &str) -> (&str, &str) {
    let end = text.find(|c: char| !is_name_char(c)).unwrap_or(text.len());
    text.split_at(end)
}

/// Splits content into lines that keep their terminators so excluded ranges
/// can be dropped without touching the bytes of any other line.
pub(crate) fn split_lines(content: &str) -> Vec<&str> {
    content.split_inclusive('\n').collect()
}

pub(crate) fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

pub(crate) fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Appends `record` to `content`, separating it from existing text by a
/// newline (and by `separator` when the content is non-empty).
pub(crate) fn append_record(content: &str, record: &str, separator: &str) -> String {
    let mut out = String::with_capacity(content.len() + record.len() + 2);
    out.push_str(content);
    if !out.is_empty() {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(separator);
    }
    out.push_str(record);
    out
}
