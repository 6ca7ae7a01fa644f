//! Minimal grammar checker for the two record formats, so validation does
//! not depend on an external interpreter.
//!
//! Aliases: every line is blank, a comment, or `alias NAME=WORD` where WORD
//! is a single, fully quoted shell word.
//!
//! Functions: every top-level line is blank, a comment, a function header or
//! the opening brace of the header before it; braces balance; no quote is
//! left open at end of file.

use std::{fs, path::Path};

use super::{SyntaxOracle, Verdict};
use crate::{
    parser::{
        alias,
        function::header_name,
        lexer::{scan_line, LexState},
        split_lines, strip_eol,
    },
    store::DefinitionKind,
    Result,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinOracle;

impl SyntaxOracle for BuiltinOracle {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn validate(&self, path: &Path, kind: DefinitionKind) -> Result<Verdict> {
        let content = fs::read_to_string(path)?;
        Ok(check(&content, kind))
    }
}

pub fn check(content: &str, kind: DefinitionKind) -> Verdict {
    let outcome = match kind {
        DefinitionKind::Alias => check_aliases(content),
        DefinitionKind::Function => check_functions(content),
    };
    match outcome {
        Ok(()) => Verdict::Valid,
        Err(reason) => Verdict::Invalid(reason),
    }
}

fn check_aliases(content: &str) -> std::result::Result<(), String> {
    for (idx, raw) in split_lines(content).iter().enumerate() {
        let line = strip_eol(raw);
        if alias::is_inert(line) {
            continue;
        }
        let (_, value) = alias::split_record(line)
            .ok_or_else(|| format!("line {}: not an alias definition", idx + 1))?;
        single_word(value).map_err(|reason| format!("line {}: {reason}", idx + 1))?;
    }
    Ok(())
}

/// Accepts exactly one shell word, optionally followed by a comment.
fn single_word(value: &str) -> std::result::Result<(), String> {
    let mut state = LexState::default();
    let summary = scan_line(&mut state, value);
    if state.in_string() {
        return Err("unterminated quote".into());
    }
    let word = match summary.comment_at {
        Some(at) => &value[..at],
        None => value,
    }
    .trim_end();

    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in word.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Some('\'') if ch == '\'' => quote = None,
            Some('\'') => {}
            Some(delim) if ch == delim => quote = None,
            Some(_) if ch == '\\' => escaped = true,
            Some(_) => {}
            None => match ch {
                '\\' => escaped = true,
                '\'' | '"' => quote = Some(ch),
                c if c.is_whitespace() => return Err("unquoted whitespace in value".into()),
                ';' | '&' | '|' | '<' | '>' | '(' | ')' => {
                    return Err(format!("unquoted `{ch}` in value"))
                }
                _ => {}
            },
        }
    }
    Ok(())
}

fn check_functions(content: &str) -> std::result::Result<(), String> {
    let mut state = LexState::default();
    let mut pending_header: Option<usize> = None;
    let mut block_start = 0usize;
    let mut string_start = 0usize;

    for (idx, raw) in split_lines(content).iter().enumerate() {
        let line = strip_eol(raw);
        let lineno = idx + 1;
        let top_level = state.at_top_level();
        let trimmed = line.trim_start();
        let inert = trimmed.is_empty() || trimmed.starts_with('#');

        if top_level && !inert {
            if let Some(header) = pending_header {
                if !trimmed.starts_with('{') {
                    return Err(format!("line {header}: function header has no body"));
                }
            } else if header_name(line).is_none() {
                return Err(format!("line {lineno}: text outside a function definition"));
            } else {
                pending_header = Some(lineno);
            }
        }

        let was_in_string = state.in_string();
        let summary = scan_line(&mut state, line);
        if summary.trough < 0 {
            return Err(format!("line {lineno}: unmatched `}}`"));
        }
        if top_level && summary.peak > 0 {
            pending_header = None;
            block_start = lineno;
        }
        if !was_in_string && state.in_string() {
            string_start = lineno;
        }
    }

    if state.in_string() {
        return Err(format!("line {string_start}: unterminated quote"));
    }
    if state.depth > 0 {
        return Err(format!("line {block_start}: block is never closed"));
    }
    if let Some(header) = pending_header {
        return Err(format!("line {header}: function header has no body"));
    }
    Ok(())
}
