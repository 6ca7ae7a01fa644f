//! Quote-, escape- and comment-aware brace counter.
//!
//! State carries across lines so multi-line strings keep their braces out
//! of the depth count. Rules:
//! * single quotes are literal: a backslash inside them escapes nothing;
//! * inside double quotes and backticks, and unquoted, a backslash escapes
//!   the next character (so `\"` does not toggle a string);
//! * an unquoted `#` at the start of a word starts a comment that runs to
//!   the end of the line (`$#` and `${#var}` are not comments);
//! * outside strings `{` increments and `}` decrements the depth.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexState {
    pub depth: i64,
    /// Open quote delimiter, if the scan is inside a string.
    pub quote: Option<char>,
    escaped: bool,
}

impl LexState {
    pub fn in_string(&self) -> bool {
        self.quote.is_some()
    }

    pub fn at_top_level(&self) -> bool {
        self.depth == 0 && self.quote.is_none()
    }
}

/// What one line did to the lexer state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineSummary {
    /// Highest depth reached while scanning the line.
    pub peak: i64,
    /// Lowest depth reached while scanning the line.
    pub trough: i64,
    /// The line contains a `}` outside any string or comment.
    pub closed: bool,
    /// Byte offset of the comment marker, if the line has a trailing comment.
    pub comment_at: Option<usize>,
    /// The line started inside a string.
    pub started_in_string: bool,
}

pub fn scan_line(state: &mut LexState, line: &str) -> LineSummary {
    let mut summary = LineSummary {
        peak: state.depth,
        trough: state.depth,
        started_in_string: state.in_string(),
        ..LineSummary::default()
    };
    let mut prev: Option<char> = None;

    for (idx, ch) in line.char_indices() {
        if state.escaped {
            state.escaped = false;
            prev = Some(ch);
            continue;
        }
        match state.quote {
            Some('\'') => {
                if ch == '\'' {
                    state.quote = None;
                }
            }
            Some(delim) => {
                if ch == '\\' {
                    state.escaped = true;
                } else if ch == delim {
                    state.quote = None;
                }
            }
            None => match ch {
                '\\' => state.escaped = true,
                '\'' | '"' | '`' => state.quote = Some(ch),
                '#' if starts_word(prev) => {
                    summary.comment_at = Some(idx);
                    break;
                }
                '{' => {
                    state.depth += 1;
                    summary.peak = summary.peak.max(state.depth);
                }
                '}' => {
                    state.depth -= 1;
                    summary.closed = true;
                    summary.trough = summary.trough.min(state.depth);
                }
                _ => {}
            },
        }
        prev = Some(ch);
    }

    // A trailing backslash continues the line; it never escapes the next line's first char.
    state.escaped = false;
    summary
}

fn starts_word(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, ';' | '&' | '|' | '(' | ')'),
    }
}

/// Text of `line` with any trailing comment removed, given the state the
/// line starts in. The state itself is not advanced.
pub fn strip_comment<'a>(state: &LexState, line: &'a str) -> &'a str {
    let mut probe = state.clone();
    match scan_line(&mut probe, line).comment_at {
        Some(at) => &line[..at],
        None => line,
    }
}
