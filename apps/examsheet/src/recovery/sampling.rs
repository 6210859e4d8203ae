//! Bubble sampling.
//!
//! Each bubble center is mapped into the scan and a fixed-radius disc is sampled for
//! its dark-pixel fraction. When both panel fiducials of a question are found near
//! where the mapping expects them, their observed offset is interpolated along the
//! panel and added to every bubble of that question.

use image::GrayImage;
use tracing::debug;

use crate::layout::question_block::FIDUCIAL_SIZE;
use crate::models::{DetectedAnswer, DocPoint, QuestionCoordinates};
use crate::recovery::registration::DocToPixel;

/// Radius of the sampled disc, smaller than the printed bubble so its outline stays out.
pub const SAMPLE_RADIUS_PT: f64 = 3.0;
/// Grey level at or below which a sampled pixel counts as marked.
pub const MARK_THRESHOLD: u8 = 140;
/// Minimum dark fraction for a bubble to count as answered.
pub const ACCEPTANCE_THRESHOLD: f32 = 0.25;

/// Pixel offset applied to bubbles, linearly interpolated between two panel fiducials.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FiducialCorrection {
    top_y: f32,
    bottom_y: f32,
    top: (f64, f64),
    bottom: (f64, f64),
}

impl FiducialCorrection {
    fn at(&self, y: f32) -> (f64, f64) {
        let span = self.bottom_y - self.top_y;
        let t = if span.abs() < f32::EPSILON {
            0.0
        } else {
            ((y - self.top_y) / span).clamp(0.0, 1.0) as f64
        };
        (
            self.top.0 + (self.bottom.0 - self.top.0) * t,
            self.top.1 + (self.bottom.1 - self.top.1) * t,
        )
    }
}

/// Fraction of pixels in the disc of radius `r` around `(cx, cy)` at or below
/// `MARK_THRESHOLD`. Pixels outside the image count as white.
pub fn dark_fraction(img: &GrayImage, cx: f64, cy: f64, r: f64) -> f32 {
    let (w, h) = img.dimensions();
    let r = r.max(0.5);
    let (x0, x1) = ((cx - r).floor() as i64, (cx + r).ceil() as i64);
    let (y0, y1) = ((cy - r).floor() as i64, (cy + r).ceil() as i64);
    let (mut total, mut dark) = (0u32, 0u32);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let (px, py) = (x as f64 + 0.5 - cx, y as f64 + 0.5 - cy);
            if px * px + py * py > r * r {
                continue;
            }
            total += 1;
            let inside = x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h;
            if inside && img.get_pixel(x as u32, y as u32)[0] <= MARK_THRESHOLD {
                dark += 1;
            }
        }
    }
    if total == 0 {
        0.0
    } else {
        dark as f32 / total as f32
    }
}

/// Offset between where a fiducial square is expected and where its ink is.
fn locate_fiducial(img: &GrayImage, mapping: &DocToPixel, center: DocPoint) -> Option<(f64, f64)> {
    let (w, h) = img.dimensions();
    let (ex, ey) = mapping.apply(center);
    let ppp = mapping.pixels_per_point(center);
    let half = FIDUCIAL_SIZE as f64 * ppp;
    let (x0, x1) = ((ex - half).floor().max(0.0) as u32, (ex + half).ceil().max(0.0) as u32);
    let (y0, y1) = ((ey - half).floor().max(0.0) as u32, (ey + half).ceil().max(0.0) as u32);

    let (mut sx, mut sy, mut count) = (0.0_f64, 0.0_f64, 0u32);
    for y in y0..=y1.min(h.saturating_sub(1)) {
        for x in x0..=x1.min(w.saturating_sub(1)) {
            if img.get_pixel(x, y)[0] <= MARK_THRESHOLD {
                sx += x as f64 + 0.5;
                sy += y as f64 + 0.5;
                count += 1;
            }
        }
    }

    let expected = (FIDUCIAL_SIZE as f64 * ppp).powi(2);
    let count_f = count as f64;
    if count == 0 || count_f < expected * 0.5 || count_f > expected * 2.0 {
        return None;
    }
    Some((sx / count_f - ex, sy / count_f - ey))
}

fn fiducial_correction(
    img: &GrayImage,
    mapping: &DocToPixel,
    question: &QuestionCoordinates,
) -> Option<FiducialCorrection> {
    let [top, bottom] = question.fiducials?;
    let top_offset = locate_fiducial(img, mapping, top)?;
    let bottom_offset = locate_fiducial(img, mapping, bottom)?;
    Some(FiducialCorrection {
        top_y: top.y,
        bottom_y: bottom.y,
        top: top_offset,
        bottom: bottom_offset,
    })
}

/// Scores every bubble of one question. The second value lists the letters whose
/// fraction reached the acceptance threshold.
pub fn detect_question(
    img: &GrayImage,
    mapping: &DocToPixel,
    question: &QuestionCoordinates,
) -> (DetectedAnswer, Vec<char>) {
    let correction = fiducial_correction(img, mapping, question);
    if let Some(c) = &correction {
        debug!(question = question.number, top = ?c.top, bottom = ?c.bottom, "Fiducial correction");
    }

    let mut best: Option<(char, f32)> = None;
    let mut marked = Vec::new();
    for bubble in &question.bubbles {
        let center = DocPoint::new(bubble.x, bubble.y);
        let (mut px, mut py) = mapping.apply(center);
        if let Some(c) = &correction {
            let (ox, oy) = c.at(bubble.y);
            px += ox;
            py += oy;
        }
        let radius = SAMPLE_RADIUS_PT * mapping.pixels_per_point(center);
        let fraction = dark_fraction(img, px, py, radius);
        if fraction >= ACCEPTANCE_THRESHOLD {
            marked.push(bubble.letter);
        }
        if best.map_or(true, |(_, f)| fraction > f) {
            best = Some((bubble.letter, fraction));
        }
    }

    let (letter, fraction) = best.unwrap_or((' ', 0.0));
    let answer = DetectedAnswer {
        question_number: question.number,
        opinion: (fraction >= ACCEPTANCE_THRESHOLD).then_some(letter),
        confidence: (fraction * 1.5).min(1.0),
    };
    (answer, marked)
}
