//! Page-1 header and instructions.
//!
//! Offsets are measured downward from `PageGeometry::first_page_top` for the header
//! and from the instructions' own top for the instructions block, matching the
//! convention of `question_block`.

use tracing::debug;

use crate::layout::font_metrics::{FontFamily, TextStyle};
use crate::layout::geometry::PageGeometry;
use crate::layout::markup::{parse_mixed, MarkupStyles, Segment};
use crate::layout::question_block::{ImageBox, PlacedText};
use crate::layout::wrap::{wrap_segments, wrap_segments_with_spacing};
use crate::models::ExamMeta;

const INSTITUTION_STYLE: TextStyle = TextStyle::new(FontFamily::HelveticaBold, 13.0);
const TITLE_STYLE: TextStyle = TextStyle::new(FontFamily::HelveticaBold, 12.0);
const SUBTITLE_STYLE: TextStyle = TextStyle::new(FontFamily::Helvetica, 10.0);
const DATE_STYLE: TextStyle = TextStyle::new(FontFamily::Helvetica, 9.0);
pub const FIELD_LABEL_STYLE: TextStyle = TextStyle::new(FontFamily::HelveticaBold, 9.0);
pub const INSTRUCTIONS_TITLE_STYLE: TextStyle = TextStyle::new(FontFamily::HelveticaBold, 10.0);

const LOGO_MAX_WIDTH: f32 = 48.0;
const LOGO_MAX_HEIGHT: f32 = 40.0;
const LOGO_GAP: f32 = 8.0;
const TEXT_LINE_GAP: f32 = 2.0;
const FIELD_ROW_HEIGHT: f32 = 18.0;
const HEADER_BOTTOM_PAD: f32 = 8.0;

const INSTRUCTIONS_BASE_SIZE: f32 = 9.0;
const INSTRUCTIONS_SHRINK: f32 = 0.92;
const INSTRUCTIONS_MAX_STEPS: u32 = 6;
const INSTRUCTIONS_SPACING: (f32, f32) = (1.3, 1.15);
const INSTRUCTIONS_TITLE_GAP: f32 = 3.0;
const INSTRUCTIONS_BOTTOM_PAD: f32 = 10.0;

/// A fill-in line such as `Name: ________`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlankField {
    pub label: &'static str,
    pub label_x: f32,
    /// Baseline offset; the rule is drawn along it.
    pub baseline: f32,
    pub rule_start: f32,
    pub rule_end: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderLayout {
    pub left_logo: Option<ImageBox>,
    pub right_logo: Option<ImageBox>,
    pub lines: Vec<PlacedText>,
    pub fields: Vec<BlankField>,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstructionsLayout {
    pub title_x: f32,
    pub body: PlacedText,
    pub size_pt: f32,
    pub line_spacing: f32,
    pub height: f32,
    /// Still taller than the space it was offered at the smallest size.
    pub overflow: bool,
}

fn fit_logo(px: (u32, u32)) -> (f32, f32) {
    let (w, h) = (px.0.max(1) as f32, px.1.max(1) as f32);
    let scale = (LOGO_MAX_WIDTH / w).min(LOGO_MAX_HEIGHT / h);
    (w * scale, h * scale)
}

/// Lays out the title block. Logo sizes are the decoded pixel sizes, when present.
pub fn layout_header(
    geometry: &PageGeometry,
    meta: &ExamMeta,
    left_logo_px: Option<(u32, u32)>,
    right_logo_px: Option<(u32, u32)>,
) -> HeaderLayout {
    let top = geometry.first_page_top();
    let mut text_left = geometry.content_left();
    let mut text_right = geometry.qr_origin().x - LOGO_GAP;

    let left_logo = left_logo_px.map(|px| {
        let (width, height) = fit_logo(px);
        let placed = ImageBox {
            x: geometry.content_left(),
            top: 0.0,
            width,
            height,
        };
        text_left += width + LOGO_GAP;
        placed
    });
    let right_logo = right_logo_px.map(|px| {
        let (width, height) = fit_logo(px);
        let placed = ImageBox {
            x: text_right - width,
            top: 0.0,
            width,
            height,
        };
        text_right -= width + LOGO_GAP;
        placed
    });

    let text_width = (text_right - text_left).max(40.0);
    let mut entries: Vec<(String, TextStyle)> = vec![
        (meta.institution.clone(), INSTITUTION_STYLE),
        (meta.title.clone(), TITLE_STYLE),
    ];
    if let Some(subtitle) = meta.subtitle.as_ref().filter(|s| !s.trim().is_empty()) {
        entries.push((subtitle.clone(), SUBTITLE_STYLE));
    }
    if let Some(date) = meta.date {
        entries.push((format!("Date: {}", date.format("%Y-%m-%d")), DATE_STYLE));
    }

    let mut cursor = 0.0_f32;
    let mut lines = Vec::new();
    for (text, style) in entries {
        if text.trim().is_empty() {
            continue;
        }
        let wrapped = wrap_segments(&[Segment::plain(text, style)], text_width);
        let height = wrapped.height;
        lines.push(PlacedText {
            x: text_left,
            top: cursor,
            text: wrapped,
        });
        cursor += height + TEXT_LINE_GAP;
    }

    let logo_bottom = [left_logo.as_ref(), right_logo.as_ref()]
        .into_iter()
        .flatten()
        .map(|b| b.top + b.height)
        .fold(0.0_f32, f32::max);
    // Fields run the full content width, so they start below the QR caption.
    let qr_clearance = top - geometry.continuation_top();
    cursor = cursor.max(logo_bottom).max(qr_clearance) + 4.0;

    let left = geometry.content_left();
    let mut fields = Vec::with_capacity(2);
    for (label, rule_end) in [
        ("Name:", geometry.content_right()),
        ("Group:", left + geometry.content_width() / 2.0),
    ] {
        cursor += FIELD_ROW_HEIGHT;
        fields.push(BlankField {
            label,
            label_x: left,
            baseline: cursor - 4.0,
            rule_start: left + FIELD_LABEL_STYLE.width_pt(label) + 4.0,
            rule_end,
        });
    }

    HeaderLayout {
        left_logo,
        right_logo,
        lines,
        fields,
        height: cursor + HEADER_BOTTOM_PAD,
    }
}

fn instructions_at(geometry: &PageGeometry, text: &str, step: u32) -> InstructionsLayout {
    let size_pt = INSTRUCTIONS_BASE_SIZE * INSTRUCTIONS_SHRINK.powi(step as i32);
    let t = step as f32 / INSTRUCTIONS_MAX_STEPS as f32;
    let line_spacing = INSTRUCTIONS_SPACING.0 + (INSTRUCTIONS_SPACING.1 - INSTRUCTIONS_SPACING.0) * t;
    let styles = MarkupStyles {
        plain: TextStyle::new(FontFamily::Helvetica, size_pt),
        mono: TextStyle::new(FontFamily::Courier, size_pt * 0.9),
    };
    let wrapped = wrap_segments_with_spacing(
        &parse_mixed(text, &styles),
        geometry.content_width(),
        line_spacing,
    );
    let body_top = INSTRUCTIONS_TITLE_STYLE.size_pt * 1.22 + INSTRUCTIONS_TITLE_GAP;
    let height = body_top + wrapped.height + INSTRUCTIONS_BOTTOM_PAD;
    InstructionsLayout {
        title_x: geometry.content_left(),
        body: PlacedText {
            x: geometry.content_left(),
            top: body_top,
            text: wrapped,
        },
        size_pt,
        line_spacing,
        height,
        overflow: false,
    }
}

/// Shrinks the instructions in bounded steps until they fit `available` points.
/// Never truncates: past the last step the smallest rendition is returned flagged.
pub fn fit_instructions(geometry: &PageGeometry, text: &str, available: f32) -> InstructionsLayout {
    let mut layout = instructions_at(geometry, text, 0);
    for step in 1..=INSTRUCTIONS_MAX_STEPS {
        if layout.height <= available {
            break;
        }
        layout = instructions_at(geometry, text, step);
    }
    if layout.height > available {
        layout.overflow = true;
    }
    debug!(
        size_pt = layout.size_pt,
        height = layout.height,
        available,
        overflow = layout.overflow,
        "Instructions fitted"
    );
    layout
}
