//! Function records and the block boundary scanner.
//!
//! A single forward pass tracks the lexer state for the whole file. Headers
//! are only recognised at top level (depth 0, outside strings), so a function
//! defined inside another function's body belongs to that body. A block runs
//! from its header to the first line where the depth returns to zero, having
//! gone positive, on a `}` outside any string.

use super::{
    append_record, is_blank, is_valid_name, leading_token,
    lexer::{scan_line, LexState},
    split_lines, strip_eol,
};
use crate::{Error, Result};

const KEYWORD: &str = "function";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub name: String,
    pub body: String,
}

impl FunctionEntry {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }

    /// Serialized block:
    ///
    /// ```text
    /// name() {
    /// <body>
    /// }
    /// ```
    pub fn to_block(&self) -> String {
        let body = self.body.trim_end_matches(['\n', '\r']);
        if body.is_empty() {
            format!("{}() {{\n    :\n}}\n", self.name)
        } else {
            format!("{}() {{\n{body}\n}}\n", self.name)
        }
    }
}

/// Line range of one top-level function block (inclusive, zero-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBlock {
    pub name: String,
    pub start: usize,
    pub end: usize,
    /// `false` when the file ended before the block closed.
    pub closed: bool,
}

impl FunctionBlock {
    pub fn line_count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Name declared by a function header line, in either the keyword form
/// (`function name`, `function name()`, `function name {`) or the bare
/// form (`name()`, `name ()`). The name must be a complete token.
pub fn header_name(line: &str) -> Option<&str> {
    let text = strip_eol(line).trim_start();

    if let Some(rest) = text.strip_prefix(KEYWORD) {
        if rest.starts_with([' ', '\t']) {
            let (name, tail) = leading_token(rest.trim_start());
            let tail = tail.trim_start();
            let terminated = tail.is_empty()
                || tail.starts_with('(')
                || tail.starts_with('{')
                || tail.starts_with('#');
            return (is_valid_name(name) && terminated).then_some(name);
        }
    }

    let (name, tail) = leading_token(text);
    let tail = tail.trim_start().strip_prefix('(')?;
    tail.trim_start().strip_prefix(')')?;
    is_valid_name(name).then_some(name)
}

struct OpenBlock<'a> {
    name: &'a str,
    start: usize,
    entered: bool,
}

/// Every top-level function block, in file order.
pub fn scan(content: &str) -> Vec<FunctionBlock> {
    let lines = split_lines(content);
    let mut state = LexState::default();
    let mut open: Option<OpenBlock<'_>> = None;
    let mut blocks = Vec::new();

    for (idx, raw) in lines.iter().enumerate() {
        let line = strip_eol(raw);

        // A header must be followed by its brace body; anything else (a
        // subshell function, stray text) drops the candidate.
        if open.as_ref().is_some_and(|b| !b.entered && !may_open_body(line)) {
            open = None;
        }

        if open.is_none() && state.at_top_level() {
            if let Some(name) = header_name(line) {
                open = Some(OpenBlock {
                    name,
                    start: idx,
                    entered: false,
                });
            }
        }

        let summary = scan_line(&mut state, line);

        match open.as_mut() {
            Some(block) => {
                if summary.peak > 0 {
                    block.entered = true;
                }
                if block.entered && state.depth <= 0 && summary.closed && !state.in_string() {
                    blocks.push(FunctionBlock {
                        name: block.name.to_string(),
                        start: block.start,
                        end: idx,
                        closed: true,
                    });
                    open = None;
                    state.depth = 0;
                }
            }
            None if state.depth < 0 => state.depth = 0,
            None => {}
        }
    }

    if let Some(block) = open.filter(|b| b.entered) {
        blocks.push(FunctionBlock {
            name: block.name.to_string(),
            start: block.start,
            end: lines.len().saturating_sub(1),
            closed: false,
        });
    }
    blocks
}

fn may_open_body(line: &str) -> bool {
    let text = line.trim_start();
    is_blank(text) || text.starts_with('#') || text.starts_with('{')
}

pub fn find(content: &str, name: &str) -> Option<FunctionBlock> {
    scan(content).into_iter().find(|b| b.name == name)
}

/// Names in encounter order, first occurrence only.
pub fn names(content: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for block in scan(content) {
        if !out.contains(&block.name) {
            out.push(block.name);
        }
    }
    out
}

/// Raw text of `block` and the body as it was written by [`FunctionEntry::to_block`]
/// (the lines between a `name() {` header and a lone `}`). Blocks in any
/// other shape report their full text as the body.
pub fn extract(content: &str, block: &FunctionBlock) -> (String, String) {
    let lines = split_lines(content);
    let slice = &lines[block.start..=block.end];
    let raw: String = slice.concat();
    let raw = raw.trim_end_matches(['\n', '\r']).to_string();

    let header = strip_eol(slice[0]).trim_end();
    let footer = strip_eol(slice[slice.len() - 1]).trim();
    let body = if slice.len() >= 2 && header.ends_with('{') && footer == "}" {
        let inner: String = slice[1..slice.len() - 1].concat();
        inner.trim_end_matches(['\n', '\r']).to_string()
    } else {
        raw.clone()
    };
    (raw, body)
}

pub fn get(content: &str, name: &str) -> Option<(FunctionEntry, String)> {
    let block = find(content, name)?;
    let (raw, body) = extract(content, &block);
    Some((FunctionEntry::new(name, body), raw))
}

/// Content with every top-level block named `name` excluded. A blank
/// separator line left orphaned by the removal goes with the block.
///
/// Returns `Ok(None)` when no block has that name, and `SyntaxInvalid` when
/// the block never closes (removing it would swallow the rest of the file).
pub fn remove(content: &str, name: &str) -> Result<Option<String>> {
    let targets: Vec<FunctionBlock> = scan(content)
        .into_iter()
        .filter(|b| b.name == name)
        .collect();
    if targets.is_empty() {
        return Ok(None);
    }
    if let Some(open) = targets.iter().find(|b| !b.closed) {
        return Err(Error::SyntaxInvalid {
            path: format!("function {name}"),
            detail: format!("block starting on line {} is never closed", open.start + 1),
        }
        .into());
    }

    let lines = split_lines(content);
    let mut keep = vec![true; lines.len()];
    for block in &targets {
        keep[block.start..=block.end].fill(false);
        let after = block.end + 1;
        let orphaned_separator = after < lines.len()
            && is_blank(lines[after])
            && (block.start == 0 || is_blank(lines[block.start - 1]) || !keep[block.start - 1]);
        if orphaned_separator {
            keep[after] = false;
        } else if after == lines.len() && block.start > 0 && is_blank(lines[block.start - 1]) {
            keep[block.start - 1] = false;
        }
    }

    let out: String = lines
        .iter()
        .zip(keep)
        .filter_map(|(line, kept)| kept.then_some(*line))
        .collect();
    Ok(Some(out))
}

pub fn append(content: &str, entry: &FunctionEntry) -> String {
    append_record(content, &entry.to_block(), "\n")
}
