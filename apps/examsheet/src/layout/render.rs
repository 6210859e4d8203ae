//! PDF drawing over a planned `ExamLayout`.
//!
//! Nothing here measures or decides placement; every position comes from the plan,
//! so the document and the coordinate map cannot disagree.

use std::io::{BufWriter, Write};

use image::{DynamicImage, Luma, RgbImage};
use printpdf::{
    BuiltinFont, Color, ColorBits, ColorSpace, Image, ImageTransform, ImageXObject,
    IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Point, Px,
    Rgb,
};
use qrcode::QrCode;
use tracing::{debug, info};

use crate::errors::ExamError;
use crate::layout::assets::{prepare_assets, ExamAssets};
use crate::layout::font_metrics::{FontFamily, TextStyle};
use crate::layout::geometry::{
    pt_to_mm, Corner, PageGeometry, MARK_ARM_PT, MARK_THICKNESS_PT, PAGE_HEIGHT_PT, PAGE_WIDTH_PT,
    QR_CAPTION_SIZE_PT, QR_SIZE_PT,
};
use crate::layout::header::{FIELD_LABEL_STYLE, INSTRUCTIONS_TITLE_STYLE};
use crate::layout::paginator::{plan_with_assets, ExamLayout, PagePlan, RenderOptions};
use crate::layout::question_block::{
    ImageBox, PlacedText, QuestionLayout, BUBBLE_RADIUS, FIDUCIAL_SIZE, LETTER_STYLE,
    PANEL_LABEL_STYLE,
};
use crate::models::{exam_identifier, CoordinateMap, ExamMeta, PageDescriptor, Question, VariantMap};

const FOOTER_STYLE: TextStyle = TextStyle::new(FontFamily::Helvetica, 8.0);
const CIRCLE_SEGMENTS: usize = 24;

/// Everything produced for one exam. The three parts describe the same pages.
#[derive(Debug, Clone)]
pub struct RenderedExam {
    pub document: Vec<u8>,
    pub pages: Vec<PageDescriptor>,
    pub coordinate_map: CoordinateMap,
    /// Non-fatal issues such as skipped images or overflowing blocks.
    pub warnings: Vec<String>,
}

pub fn render_exam(
    meta: &ExamMeta,
    folio: &str,
    questions: &[Question],
    variant: &VariantMap,
    options: &RenderOptions,
) -> Result<RenderedExam, ExamError> {
    let assets = prepare_assets(meta, questions);
    let layout = plan_with_assets(meta, folio, questions, variant, &assets, options)?;
    let document = draw_document(&layout, &assets, &meta.title)?;

    info!(
        folio,
        pages = layout.page_count(),
        bytes = document.len(),
        "Exam rendered"
    );
    Ok(RenderedExam {
        document,
        pages: layout.page_descriptors(),
        coordinate_map: layout.coordinate_map(),
        warnings: layout.warnings.clone(),
    })
}

fn mm(pt: f32) -> Mm {
    Mm(pt_to_mm(pt))
}

fn pdf_err(e: impl std::fmt::Display) -> ExamError {
    ExamError::Pdf(e.to_string())
}

fn draw_document(layout: &ExamLayout, assets: &ExamAssets, title: &str) -> Result<Vec<u8>, ExamError> {
    let doc_title = if title.trim().is_empty() { "Exam" } else { title };
    let (doc, first_page, first_layer) =
        PdfDocument::new(doc_title, mm(PAGE_WIDTH_PT), mm(PAGE_HEIGHT_PT), "Layer 1");
    let fonts = Fonts::load(&doc)?;
    let total = layout.page_count();

    for page in &layout.pages {
        let layer = if page.page_number == 1 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (p, l) = doc.add_page(mm(PAGE_WIDTH_PT), mm(PAGE_HEIGHT_PT), "Layer 1");
            doc.get_page(p).get_layer(l)
        };
        let canvas = Canvas {
            layer,
            fonts: &fonts,
        };
        draw_page(&canvas, layout, assets, page, total)?;
    }

    let mut bytes = Vec::new();
    {
        let mut writer = BufWriter::new(&mut bytes);
        doc.save(&mut writer).map_err(pdf_err)?;
        writer.flush().map_err(pdf_err)?;
    }
    Ok(bytes)
}

fn draw_page(
    canvas: &Canvas<'_>,
    layout: &ExamLayout,
    assets: &ExamAssets,
    page: &PagePlan,
    total: u32,
) -> Result<(), ExamError> {
    let g = &layout.geometry;
    draw_registration_marks(canvas, g);
    draw_qr(canvas, g, &exam_identifier(&layout.folio, page.page_number))?;
    // Centered so it stays clear of the bottom corner marks.
    let footer = format!("Folio {} · Page {} of {}", layout.folio, page.page_number, total);
    let footer_x = (g.width() - FOOTER_STYLE.width_pt(&footer)) / 2.0;
    canvas.text(&footer, FOOTER_STYLE, footer_x, g.footer_baseline());

    if page.page_number == 1 {
        draw_header(canvas, layout, assets);
    }
    for placed in &page.questions {
        let image = assets.question_image(&placed.layout.question_id);
        draw_question(canvas, &placed.layout, placed.top_y, image);
    }
    debug!(page = page.page_number, questions = page.questions.len(), "Page drawn");
    Ok(())
}

fn draw_registration_marks(canvas: &Canvas<'_>, g: &PageGeometry) {
    let (a, t) = (MARK_ARM_PT, MARK_THICKNESS_PT);
    for corner in Corner::ALL {
        let v = g.mark_vertex(corner);
        let (dx, dy) = corner.inward();
        canvas.bar((v.x, v.y + dy * t / 2.0), (v.x + dx * a, v.y + dy * t / 2.0), t);
        canvas.bar((v.x + dx * t / 2.0, v.y), (v.x + dx * t / 2.0, v.y + dy * a), t);
    }
}

fn draw_qr(canvas: &Canvas<'_>, g: &PageGeometry, payload: &str) -> Result<(), ExamError> {
    let code = QrCode::new(payload.as_bytes()).map_err(|e| ExamError::QrEncode(e.to_string()))?;
    let luma = code.render::<Luma<u8>>().module_dimensions(1, 1).build();
    let rgb = DynamicImage::ImageLuma8(luma).to_rgb8();
    let origin = g.qr_origin();
    canvas.image(&rgb, origin.x, origin.y, QR_SIZE_PT, false);
    canvas.text(
        payload,
        TextStyle::new(FontFamily::Helvetica, QR_CAPTION_SIZE_PT),
        origin.x,
        origin.y - QR_CAPTION_SIZE_PT,
    );
    Ok(())
}

fn draw_header(canvas: &Canvas<'_>, layout: &ExamLayout, assets: &ExamAssets) {
    let g = &layout.geometry;
    let origin = g.first_page_top();
    let header = &layout.header;

    for (logo, placed) in [
        (assets.left_logo.as_ref(), header.left_logo.as_ref()),
        (assets.right_logo.as_ref(), header.right_logo.as_ref()),
    ] {
        if let (Some(img), Some(b)) = (logo, placed) {
            canvas.image(img, b.x, origin - b.top - b.height, b.width, true);
        }
    }
    for line in &header.lines {
        canvas.wrapped(line, origin);
    }
    for field in &header.fields {
        let baseline = origin - field.baseline;
        canvas.text(field.label, FIELD_LABEL_STYLE, field.label_x, baseline);
        canvas.stroke(&[(field.rule_start, baseline), (field.rule_end, baseline)], false, 0.6, 0.0);
    }

    if let Some(instructions) = &layout.instructions {
        let top = instructions.top_y;
        canvas.text(
            "Instructions",
            INSTRUCTIONS_TITLE_STYLE,
            instructions.layout.title_x,
            top - INSTRUCTIONS_TITLE_STYLE.size_pt,
        );
        canvas.wrapped(&instructions.layout.body, top);
    }
}

fn draw_question(canvas: &Canvas<'_>, q: &QuestionLayout, top_y: f32, image: Option<&RgbImage>) {
    canvas.wrapped(&q.statement, top_y);

    if let (Some(img), Some(b)) = (image, q.image.as_ref()) {
        let ImageBox { x, top, width, height } = *b;
        canvas.image(img, x, top_y - top - height, width, true);
    }

    for choice in &q.choices {
        let baseline = choice
            .body
            .text
            .lines
            .first()
            .map_or(top_y - choice.body.top - LETTER_STYLE.size_pt, |line| {
                top_y - choice.body.top - baseline_offset(line.height, line_max_size(line))
            });
        canvas.text(&format!("{})", choice.letter), LETTER_STYLE, choice.label_x, baseline);
        canvas.wrapped(&choice.body, top_y);
    }

    let p = &q.panel;
    let (left, right) = (p.x, p.x + p.width);
    let (upper, lower) = (top_y - p.top, top_y - p.top - p.height);
    canvas.stroke(&[(left, upper), (right, upper), (right, lower), (left, lower)], true, 0.8, 0.0);
    canvas.text(&format!("Q{}", q.number), PANEL_LABEL_STYLE, left + 6.0, upper - 10.0);
    for &(letter, cx, offset) in &p.bubbles {
        let cy = top_y - offset;
        canvas.circle(cx, cy, BUBBLE_RADIUS);
        canvas.text(
            &letter.to_string(),
            PANEL_LABEL_STYLE,
            p.label_x,
            cy - PANEL_LABEL_STYLE.size_pt * 0.35,
        );
    }
    for (fx, offset) in p.fiducials {
        let fy = top_y - offset;
        canvas.bar(
            (fx - FIDUCIAL_SIZE / 2.0, fy),
            (fx + FIDUCIAL_SIZE / 2.0, fy),
            FIDUCIAL_SIZE,
        );
    }

    let sep = top_y - q.separator;
    canvas.stroke(&[(q.statement.x, sep), (right, sep)], false, 0.3, 0.75);
}

fn line_max_size(line: &crate::layout::wrap::WrappedLine) -> f32 {
    line.fragments
        .iter()
        .map(|f| f.style.size_pt)
        .fold(0.0_f32, f32::max)
}

/// Distance from a line's top edge to its baseline, centering the glyphs in the leading.
fn baseline_offset(line_height: f32, max_size: f32) -> f32 {
    max_size * 0.8 + (line_height - max_size) / 2.0
}

// ────────────────────────────────────────────────────────────────────────────
// Drawing primitives
// ────────────────────────────────────────────────────────────────────────────

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    mono: IndirectFontRef,
}

impl Fonts {
    fn load(doc: &PdfDocumentReference) -> Result<Self, ExamError> {
        Ok(Self {
            regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?,
            bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?,
            mono: doc.add_builtin_font(BuiltinFont::Courier).map_err(pdf_err)?,
        })
    }

    fn get(&self, font: FontFamily) -> &IndirectFontRef {
        match font {
            FontFamily::Helvetica => &self.regular,
            FontFamily::HelveticaBold => &self.bold,
            FontFamily::Courier => &self.mono,
        }
    }
}

struct Canvas<'a> {
    layer: PdfLayerReference,
    fonts: &'a Fonts,
}

impl Canvas<'_> {
    fn text(&self, text: &str, style: TextStyle, x: f32, baseline: f32) {
        if text.is_empty() {
            return;
        }
        self.layer
            .use_text(text, style.size_pt, mm(x), mm(baseline), self.fonts.get(style.font));
    }

    /// Draws wrapped text whose offsets are measured down from `origin_y`.
    fn wrapped(&self, placed: &PlacedText, origin_y: f32) {
        let mut line_top = origin_y - placed.top;
        for line in &placed.text.lines {
            let baseline = line_top - baseline_offset(line.height, line_max_size(line));
            for fragment in &line.fragments {
                self.text(&fragment.text, fragment.style, placed.x + fragment.x, baseline);
            }
            line_top -= line.height;
        }
    }

    /// Polyline in a grey level (0 = black).
    fn stroke(&self, points: &[(f32, f32)], closed: bool, thickness: f32, grey: f32) {
        self.layer
            .set_outline_color(Color::Rgb(Rgb::new(grey, grey, grey, None)));
        self.layer.set_outline_thickness(thickness);
        self.layer.add_line(Line {
            points: points
                .iter()
                .map(|&(x, y)| (Point::new(mm(x), mm(y)), false))
                .collect(),
            is_closed: closed,
        });
    }

    /// Solid black bar along a segment; with butt caps this fills a rectangle.
    fn bar(&self, from: (f32, f32), to: (f32, f32), thickness: f32) {
        self.stroke(&[from, to], false, thickness, 0.0);
    }

    fn circle(&self, cx: f32, cy: f32, r: f32) {
        let points: Vec<(f32, f32)> = (0..CIRCLE_SEGMENTS)
            .map(|i| {
                let a = i as f32 / CIRCLE_SEGMENTS as f32 * std::f32::consts::TAU;
                (cx + r * a.cos(), cy + r * a.sin())
            })
            .collect();
        self.stroke(&points, true, 0.8, 0.0);
    }

    /// Places `img` with its bottom-left corner at `(x, y)`, scaled to `width` points.
    fn image(&self, img: &RgbImage, x: f32, y: f32, width: f32, interpolate: bool) {
        let (px_w, px_h) = img.dimensions();
        if px_w == 0 || px_h == 0 || width <= 0.0 {
            return;
        }
        let image = Image::from(ImageXObject {
            width: Px(px_w as usize),
            height: Px(px_h as usize),
            color_space: ColorSpace::Rgb,
            bits_per_component: ColorBits::Bit8,
            interpolate,
            image_data: img.as_raw().clone(),
            image_filter: None,
            clipping_bbox: None,
            smask: None,
        });
        let dpi = px_w as f32 / (width / 72.0);
        image.add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(mm(x)),
                translate_y: Some(mm(y)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::generate_variant;
    use crate::models::Choice;

    fn make_questions(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| Question {
                id: format!("q{i}"),
                statement: format!("What does this print?\n```\nprintln!(\"{{}}\", {i});\n```"),
                image: None,
                choices: (0..5)
                    .map(|c| Choice {
                        text: format!("`{}`", c * i),
                        is_correct: c == 0,
                    })
                    .collect(),
            })
            .collect()
    }

    fn meta() -> ExamMeta {
        ExamMeta {
            institution: "Institute".into(),
            title: "Rust Fundamentals".into(),
            instructions: Some("Use a dark pen.".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_produces_pdf_and_matching_map() {
        let questions = make_questions(60);
        let variant = generate_variant(&questions);
        let rendered =
            render_exam(&meta(), "A1B2", &questions, &variant, &RenderOptions::default()).unwrap();
        assert!(rendered.document.starts_with(b"%PDF"));
        assert!(!rendered.pages.is_empty());
        assert_eq!(rendered.pages.len(), rendered.coordinate_map.pages.len());
        assert_eq!(rendered.coordinate_map.question_count(), 60);
        for (i, page) in rendered.pages.iter().enumerate() {
            assert_eq!(page.page_number, i as u32 + 1);
            assert_eq!(page.identifier, format!("EXAM:A1B2:P{}", i + 1));
        }
        for page in &rendered.coordinate_map.pages {
            for q in &page.questions {
                assert_eq!(q.bubbles.len(), 5);
            }
        }
    }

    #[test]
    fn test_render_rejects_invalid_variant() {
        let questions = make_questions(2);
        let mut variant = generate_variant(&questions);
        if let Some(order) = variant.option_order_by_question.get_mut("q0") {
            order[0] = order[1];
        }
        let err = render_exam(&meta(), "F", &questions, &variant, &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(err, ExamError::InvalidVariant(_)));
    }

    #[test]
    fn test_render_with_empty_question_list() {
        let variant = generate_variant(&[]);
        let options = RenderOptions {
            min_pages: 2,
            ..Default::default()
        };
        let rendered = render_exam(&meta(), "EMPTY", &[], &variant, &options).unwrap();
        assert_eq!(rendered.pages.len(), 2);
        assert_eq!(rendered.coordinate_map.question_count(), 0);
    }

    #[test]
    fn test_baseline_sits_inside_line() {
        let offset = baseline_offset(12.2, 10.0);
        assert!(offset > 0.0 && offset < 12.2);
    }
}
