//! Mixed-mode text: prose with inline `` `code` `` runs and fenced ```` ``` ```` blocks.
//!
//! A statement is first split on fences into alternating plain/monospace blocks, then
//! each plain block is split on single backticks into alternating plain/monospace runs.
//! Whitespace is collapsed inside plain runs only; monospace text is kept verbatim.

use serde::{Deserialize, Serialize};

use crate::layout::font_metrics::TextStyle;

const FENCE: &str = "```";
const INLINE: char = '`';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    Plain,
    InlineCode,
    /// A fenced block. Every source line becomes its own printed line.
    CodeBlock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub style: TextStyle,
    pub kind: SegmentKind,
    /// Inserted between runs of different kind; not part of the source text.
    pub synthetic: bool,
}

impl Segment {
    pub fn plain(text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            text: text.into(),
            style,
            kind: SegmentKind::Plain,
            synthetic: false,
        }
    }
}

/// Fonts used for the two kinds of run.
#[derive(Debug, Clone, Copy)]
pub struct MarkupStyles {
    pub plain: TextStyle,
    pub mono: TextStyle,
}

/// Parses `text` into typed segments, inserting synthetic spaces between runs of
/// different kind when neither side already carries whitespace.
pub fn parse_mixed(text: &str, styles: &MarkupStyles) -> Vec<Segment> {
    let mut runs = Vec::new();
    for (is_code, block) in split_paired(text, FENCE) {
        if is_code {
            let body = strip_fence_body(&block);
            if !body.is_empty() {
                runs.push(Segment {
                    text: body.to_string(),
                    style: styles.mono,
                    kind: SegmentKind::CodeBlock,
                    synthetic: false,
                });
            }
            continue;
        }
        for (is_inline, run) in split_paired(&block, &INLINE.to_string()) {
            if is_inline {
                if !run.is_empty() {
                    runs.push(Segment {
                        text: run.to_string(),
                        style: styles.mono,
                        kind: SegmentKind::InlineCode,
                        synthetic: false,
                    });
                }
            } else {
                let collapsed = collapse_whitespace(&run);
                if !collapsed.is_empty() {
                    runs.push(Segment::plain(collapsed, styles.plain));
                }
            }
        }
    }
    insert_synthetic_spaces(runs, styles.plain)
}

/// Splits on a paired delimiter. Odd pieces are the delimited spans. An unpaired
/// trailing delimiter is kept as literal text of the preceding unquoted piece.
fn split_paired<'a>(text: &'a str, delimiter: &str) -> Vec<(bool, std::borrow::Cow<'a, str>)> {
    let pieces: Vec<&str> = text.split(delimiter).collect();
    let mut out: Vec<(bool, std::borrow::Cow<'a, str>)> = Vec::with_capacity(pieces.len());
    let paired_len = if pieces.len() % 2 == 0 {
        pieces.len() - 1
    } else {
        pieces.len()
    };
    for (i, piece) in pieces[..paired_len].iter().enumerate() {
        out.push((i % 2 == 1, std::borrow::Cow::Borrowed(*piece)));
    }
    if paired_len < pieces.len() {
        // Odd number of delimiters: glue the dangling one back as literal text.
        let dangling = format!("{delimiter}{}", pieces[paired_len]);
        match out.last_mut() {
            Some((false, last)) => last.to_mut().push_str(&dangling),
            _ => out.push((false, std::borrow::Cow::Owned(dangling))),
        }
    }
    out
}

/// Drops an info string (```` ```rust ````) and the newlines hugging the fences.
fn strip_fence_body(block: &str) -> &str {
    let mut body = block;
    if let Some((first, rest)) = body.split_once('\n') {
        let tag = first.trim();
        if tag.is_empty()
            || tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-' | '#'))
        {
            body = rest;
        }
    }
    body.strip_suffix('\n')
        .map(|b| b.strip_suffix('\r').unwrap_or(b))
        .unwrap_or(body)
}

/// Collapses every whitespace run to a single space, keeping one space at either end
/// when the source had whitespace there.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn insert_synthetic_spaces(runs: Vec<Segment>, plain: TextStyle) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(runs.len() * 2);
    for run in runs {
        if let Some(prev) = out.last() {
            let prev_ws = prev.text.chars().last().is_some_and(char::is_whitespace);
            let next_ws = run.text.chars().next().is_some_and(char::is_whitespace);
            if prev.kind != run.kind && !prev_ws && !next_ws {
                out.push(Segment {
                    text: " ".to_string(),
                    style: plain,
                    kind: SegmentKind::Plain,
                    synthetic: true,
                });
            }
        }
        out.push(run);
    }
    out
}
