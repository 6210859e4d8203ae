//! Greedy word-wrap over a stream of typed segments.
//!
//! Plain runs break on whitespace; a leading space is only kept when the word lands
//! mid-line. Inline code is one unbreakable token. Fenced blocks emit one token per
//! source line and always start and end a line. A token wider than the whole line is
//! split character by character, so nothing ever overflows silently.

use crate::layout::font_metrics::TextStyle;
use crate::layout::markup::{Segment, SegmentKind};

/// Line height as a multiple of the largest font size on the line.
pub const LINE_SPACING: f32 = 1.22;

/// A run of same-styled text placed on one line. `x` is relative to the line start.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub text: String,
    pub style: TextStyle,
    pub x: f32,
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrappedLine {
    pub fragments: Vec<Fragment>,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WrappedText {
    pub lines: Vec<WrappedLine>,
    pub height: f32,
}

impl WrappedText {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

#[derive(Debug)]
enum Token<'a> {
    Word {
        text: &'a str,
        style: TextStyle,
        space_before: bool,
    },
    /// End the current line if it holds anything.
    Break,
}

/// Wraps `segments` into lines no wider than `max_width` points.
pub fn wrap_segments(segments: &[Segment], max_width: f32) -> WrappedText {
    wrap_segments_with_spacing(segments, max_width, LINE_SPACING)
}

pub fn wrap_segments_with_spacing(segments: &[Segment], max_width: f32, line_spacing: f32) -> WrappedText {
    let mut builder = LineBuilder::new(max_width.max(1.0), line_spacing);
    for token in tokenize(segments) {
        match token {
            Token::Break => builder.flush(),
            Token::Word {
                text,
                style,
                space_before,
            } => builder.push_word(text, style, space_before),
        }
    }
    builder.finish()
}

fn tokenize(segments: &[Segment]) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut pending_space = false;

    for seg in segments {
        match seg.kind {
            SegmentKind::Plain => {
                let mut rest = seg.text.as_str();
                while !rest.is_empty() {
                    let trimmed = rest.trim_start();
                    if trimmed.len() != rest.len() {
                        pending_space = true;
                    }
                    if trimmed.is_empty() {
                        break;
                    }
                    let end = trimmed
                        .find(char::is_whitespace)
                        .unwrap_or(trimmed.len());
                    tokens.push(Token::Word {
                        text: &trimmed[..end],
                        style: seg.style,
                        space_before: pending_space,
                    });
                    pending_space = false;
                    rest = &trimmed[end..];
                }
            }
            SegmentKind::InlineCode => {
                tokens.push(Token::Word {
                    text: &seg.text,
                    style: seg.style,
                    space_before: pending_space,
                });
                pending_space = false;
            }
            SegmentKind::CodeBlock => {
                tokens.push(Token::Break);
                for line in seg.text.split('\n') {
                    tokens.push(Token::Word {
                        text: line.strip_suffix('\r').unwrap_or(line),
                        style: seg.style,
                        space_before: false,
                    });
                    tokens.push(Token::Break);
                }
                pending_space = false;
            }
        }
    }
    tokens
}

struct LineBuilder {
    max_width: f32,
    line_spacing: f32,
    lines: Vec<WrappedLine>,
    current: Vec<Fragment>,
    current_width: f32,
}

impl LineBuilder {
    fn new(max_width: f32, line_spacing: f32) -> Self {
        Self {
            max_width,
            line_spacing,
            lines: Vec::new(),
            current: Vec::new(),
            current_width: 0.0,
        }
    }

    fn push_word(&mut self, text: &str, style: TextStyle, space_before: bool) {
        let word_w = style.width_pt(text);
        let space_w = if space_before && !self.current.is_empty() {
            style.space_width_pt()
        } else {
            0.0
        };

        if self.current_width + space_w + word_w <= self.max_width {
            self.append(text, style, space_w, word_w);
        } else if word_w <= self.max_width {
            // Line is full; the word opens the next one without its leading space.
            self.flush();
            self.append(text, style, 0.0, word_w);
        } else {
            self.flush();
            self.push_split(text, style);
        }
    }

    /// Places a token wider than a full line, one character chunk per line. The last
    /// chunk stays open so following words can share its line.
    fn push_split(&mut self, text: &str, style: TextStyle) {
        let mut chunk = String::new();
        let mut chunk_w = 0.0_f32;
        for c in text.chars() {
            let mut buf = [0u8; 4];
            let cw = style.width_pt(c.encode_utf8(&mut buf));
            if !chunk.is_empty() && chunk_w + cw > self.max_width {
                self.append(&chunk, style, 0.0, chunk_w);
                self.flush();
                chunk.clear();
                chunk_w = 0.0;
            }
            chunk.push(c);
            chunk_w += cw;
        }
        if !chunk.is_empty() {
            self.append(&chunk, style, 0.0, chunk_w);
        }
    }

    fn append(&mut self, text: &str, style: TextStyle, space_w: f32, word_w: f32) {
        match self.current.last_mut() {
            // Same style: extend the previous fragment, the gap is one space of that font.
            Some(last) if last.style == style => {
                if space_w > 0.0 {
                    last.text.push(' ');
                }
                last.text.push_str(text);
                last.width += space_w + word_w;
            }
            _ => self.current.push(Fragment {
                text: text.to_string(),
                style,
                x: self.current_width + space_w,
                width: word_w,
            }),
        }
        self.current_width += space_w + word_w;
    }

    fn flush(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let fragments = std::mem::take(&mut self.current);
        let height = fragments
            .iter()
            .map(|f| f.style.size_pt)
            .fold(0.0_f32, f32::max)
            * self.line_spacing;
        self.lines.push(WrappedLine {
            fragments,
            width: self.current_width,
            height,
        });
        self.current_width = 0.0;
    }

    fn finish(mut self) -> WrappedText {
        self.flush();
        let height = self.lines.iter().map(|l| l.height).sum();
        WrappedText {
            lines: self.lines,
            height,
        }
    }
}
