//! Question block layout. One pure geometry function serves both to measure a
//! question (pagination) and to place it (drawing + coordinate map).
//!
//! Vertical positions are offsets measured downward from the block top, so the same
//! `QuestionLayout` can be measured first and committed at any `top_y` afterwards.
//! Bubble offsets depend only on the panel header and pitch, never on how many lines
//! the statement or the choice columns took.

use crate::layout::font_metrics::{FontFamily, TextStyle};
use crate::layout::geometry::PageGeometry;
use crate::layout::markup::{parse_mixed, MarkupStyles, Segment};
use crate::layout::wrap::{wrap_segments, WrappedText};
use crate::models::{BubbleCoordinate, DocPoint, Question, QuestionCoordinates};

pub const STATEMENT_STYLES: MarkupStyles = MarkupStyles {
    plain: TextStyle::new(FontFamily::Helvetica, 10.0),
    mono: TextStyle::new(FontFamily::Courier, 9.0),
};
pub const OPTION_STYLES: MarkupStyles = MarkupStyles {
    plain: TextStyle::new(FontFamily::Helvetica, 9.0),
    mono: TextStyle::new(FontFamily::Courier, 8.5),
};
pub const NUMBER_STYLE: TextStyle = TextStyle::new(FontFamily::HelveticaBold, 10.0);
pub const LETTER_STYLE: TextStyle = TextStyle::new(FontFamily::HelveticaBold, 9.0);
pub const PANEL_LABEL_STYLE: TextStyle = TextStyle::new(FontFamily::HelveticaBold, 7.0);

const BLOCK_TOP_PAD: f32 = 6.0;
const STATEMENT_GAP: f32 = 5.0;
const IMAGE_GAP: f32 = 5.0;
const BLOCK_BOTTOM_PAD: f32 = 10.0;
pub const IMAGE_MAX_HEIGHT_PT: f32 = 150.0;
/// Natural image size assumes 96 px per inch.
const PX_TO_PT: f32 = 0.75;

const COLUMN_GAP: f32 = 12.0;
const CHOICE_GAP: f32 = 3.0;
const LETTER_INDENT: f32 = 14.0;

pub const PANEL_WIDTH: f32 = 56.0;
const PANEL_GAP: f32 = 10.0;
const PANEL_HEADER: f32 = 16.0;
const PANEL_FOOTER: f32 = 16.0;
pub const BUBBLE_PITCH: f32 = 14.0;
pub const BUBBLE_RADIUS: f32 = 5.0;
const BUBBLE_X: f32 = 32.0;
const BUBBLE_LABEL_X: f32 = 14.0;
pub const FIDUCIAL_SIZE: f32 = 4.5;
const FIDUCIAL_INSET_Y: f32 = 8.0;
const FIDUCIAL_INSET_X: f32 = 9.0;

/// Letters available on the answer panel.
pub const LETTERS: [char; 5] = ['A', 'B', 'C', 'D', 'E'];

/// Wrapped text anchored at `x`, starting `top` points below the block top.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub x: f32,
    pub top: f32,
    pub text: WrappedText,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageBox {
    pub x: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceLayout {
    pub letter: char,
    /// Index into the question's original choice list.
    pub original_index: usize,
    pub label_x: f32,
    pub body: PlacedText,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelLayout {
    pub x: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    /// `(letter, center x, center offset below block top)`.
    pub bubbles: Vec<(char, f32, f32)>,
    pub label_x: f32,
    /// Top and bottom fiducial centers as `(x, offset)`.
    pub fiducials: [(f32, f32); 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionLayout {
    pub number: u32,
    pub question_id: String,
    pub height: f32,
    pub statement: PlacedText,
    pub image: Option<ImageBox>,
    pub choices: Vec<ChoiceLayout>,
    pub panel: PanelLayout,
    /// Offset of the thin rule drawn under the block.
    pub separator: f32,
}

impl QuestionLayout {
    /// Coordinate-map entry for this block committed with its top at `top_y`.
    pub fn coordinates(&self, top_y: f32) -> QuestionCoordinates {
        let [(fx0, fy0), (fx1, fy1)] = self.panel.fiducials;
        QuestionCoordinates {
            number: self.number,
            question_id: self.question_id.clone(),
            bubbles: self
                .panel
                .bubbles
                .iter()
                .map(|&(letter, x, offset)| BubbleCoordinate {
                    letter,
                    x,
                    y: top_y - offset,
                })
                .collect(),
            fiducials: Some([
                DocPoint::new(fx0, top_y - fy0),
                DocPoint::new(fx1, top_y - fy1),
            ]),
        }
    }
}

/// Fits an image of `px` pixels into `max_width` × `IMAGE_MAX_HEIGHT_PT`, preserving
/// aspect ratio and never enlarging past natural size.
pub fn fit_image(px: (u32, u32), max_width: f32) -> (f32, f32) {
    let natural_w = px.0.max(1) as f32 * PX_TO_PT;
    let natural_h = px.1.max(1) as f32 * PX_TO_PT;
    let scale = 1.0_f32
        .min(max_width / natural_w)
        .min(IMAGE_MAX_HEIGHT_PT / natural_h);
    (natural_w * scale, natural_h * scale)
}

/// Lays out one question. Pure: the same inputs always give the same geometry.
///
/// `option_order[i]` is the original choice printed with letter `LETTERS[i]`.
/// `image_px` is the decoded size of the attached image, if it decoded.
pub fn layout_question(
    geometry: &PageGeometry,
    number: u32,
    question: &Question,
    option_order: &[usize],
    image_px: Option<(u32, u32)>,
) -> QuestionLayout {
    let left = geometry.content_left();
    let full_width = geometry.content_width();
    let mut cursor = BLOCK_TOP_PAD;

    // Statement, prefixed with its bold number.
    let mut segments = vec![Segment::plain(format!("{number}. "), NUMBER_STYLE)];
    segments.extend(parse_mixed(&question.statement, &STATEMENT_STYLES));
    let statement = PlacedText {
        x: left,
        top: cursor,
        text: wrap_segments(&segments, full_width),
    };
    cursor += statement.text.height + STATEMENT_GAP;

    // 3. Image directly below the statement.
    let image = image_px.map(|px| {
        let (width, height) = fit_image(px, full_width);
        let placed = ImageBox {
            x: left,
            top: cursor,
            width,
            height,
        };
        cursor += height + IMAGE_GAP;
        placed
    });

    // 4. Two choice columns left of the panel.
    let choices_width = full_width - PANEL_GAP - PANEL_WIDTH;
    let column_width = (choices_width - COLUMN_GAP) / 2.0;
    let split = option_order.len().div_ceil(2);
    let row_top = cursor;
    let mut column_heights = [0.0_f32; 2];
    let choices: Vec<ChoiceLayout> = option_order
        .iter()
        .take(LETTERS.len())
        .enumerate()
        .map(|(position, &original_index)| {
            let column = usize::from(position >= split);
            let column_x = left + column as f32 * (column_width + COLUMN_GAP);
            let text = question
                .choices
                .get(original_index)
                .map(|c| c.text.as_str())
                .unwrap_or_default();
            let wrapped = wrap_segments(
                &parse_mixed(text, &OPTION_STYLES),
                column_width - LETTER_INDENT,
            );
            let body = PlacedText {
                x: column_x + LETTER_INDENT,
                top: row_top + column_heights[column],
                text: wrapped,
            };
            column_heights[column] += body.text.height.max(LETTER_STYLE.size_pt * 1.22) + CHOICE_GAP;
            ChoiceLayout {
                letter: LETTERS[position],
                original_index,
                label_x: column_x,
                body,
            }
        })
        .collect();

    // 5. Answer panel: constant pitch from a fixed header offset.
    let letter_count = choices.len();
    let panel_x = left + full_width - PANEL_WIDTH;
    let panel_height = PANEL_HEADER + letter_count as f32 * BUBBLE_PITCH + PANEL_FOOTER;
    let bubbles = (0..letter_count)
        .map(|i| {
            (
                LETTERS[i],
                panel_x + BUBBLE_X,
                row_top + PANEL_HEADER + BUBBLE_PITCH * i as f32 + BUBBLE_PITCH / 2.0,
            )
        })
        .collect();
    let fiducial_x = panel_x + PANEL_WIDTH - FIDUCIAL_INSET_X;
    let panel = PanelLayout {
        x: panel_x,
        top: row_top,
        width: PANEL_WIDTH,
        height: panel_height,
        bubbles,
        label_x: panel_x + BUBBLE_LABEL_X,
        fiducials: [
            (fiducial_x, row_top + FIDUCIAL_INSET_Y),
            (fiducial_x, row_top + panel_height - FIDUCIAL_INSET_Y),
        ],
    };

    let row_height = column_heights[0].max(column_heights[1]).max(panel_height);
    cursor = row_top + row_height;
    let separator = cursor + BLOCK_BOTTOM_PAD / 2.0;
    cursor += BLOCK_BOTTOM_PAD;

    QuestionLayout {
        number,
        question_id: question.id.clone(),
        height: cursor,
        statement,
        image,
        choices,
        panel,
        separator,
    }
}
