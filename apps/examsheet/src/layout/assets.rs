//! Decoding of embedded images (question figures and header logos).
//!
//! A broken image never fails generation: it is dropped with a warning and the block
//! is laid out as if no image had been attached.

use std::collections::HashMap;

use image::{Rgb, RgbImage, Rgba};
use tracing::warn;

use crate::models::{ExamMeta, Question};

/// Decoded, alpha-flattened images keyed by what they belong to.
#[derive(Debug, Default, Clone)]
pub struct ExamAssets {
    pub question_images: HashMap<String, RgbImage>,
    pub left_logo: Option<RgbImage>,
    pub right_logo: Option<RgbImage>,
    pub warnings: Vec<String>,
}

impl ExamAssets {
    pub fn question_image(&self, question_id: &str) -> Option<&RgbImage> {
        self.question_images.get(question_id)
    }

    pub fn question_image_px(&self, question_id: &str) -> Option<(u32, u32)> {
        self.question_image(question_id).map(|img| img.dimensions())
    }
}

pub fn prepare_assets(meta: &ExamMeta, questions: &[Question]) -> ExamAssets {
    let mut assets = ExamAssets::default();

    for q in questions {
        let Some(bytes) = q.image.as_deref() else {
            continue;
        };
        match decode_flattened(bytes) {
            Ok(img) => {
                assets.question_images.insert(q.id.clone(), img);
            }
            Err(e) => {
                warn!(question_id = %q.id, error = %e, "Skipping undecodable question image");
                assets
                    .warnings
                    .push(format!("image for question {} skipped: {e}", q.id));
            }
        }
    }

    assets.left_logo = decode_logo(meta.left_logo.as_deref(), "left", &mut assets.warnings);
    assets.right_logo = decode_logo(meta.right_logo.as_deref(), "right", &mut assets.warnings);
    assets
}

fn decode_logo(bytes: Option<&[u8]>, side: &str, warnings: &mut Vec<String>) -> Option<RgbImage> {
    let bytes = bytes?;
    match decode_flattened(bytes) {
        Ok(img) => Some(img),
        Err(e) => {
            warn!(side, error = %e, "Skipping undecodable logo");
            warnings.push(format!("{side} logo skipped: {e}"));
            None
        }
    }
}

/// Decodes any format `image` understands and composites transparency onto white.
pub fn decode_flattened(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut rgb = RgbImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = a as f32 / 255.0;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        rgb.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    Ok(rgb)
}
