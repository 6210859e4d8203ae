//! Scan decoding and the greyscale working buffer.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::imageops::FilterType;
use image::{GenericImageView, GrayImage, Luma};
use tracing::debug;

use crate::errors::ExamError;

/// Decodes a scan and returns its channel-average greyscale, at most `max_width` wide.
pub fn decode_scan(bytes: &[u8], max_width: u32) -> Result<GrayImage, ExamError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| ExamError::ImageDecode(e.to_string()))?;
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(ExamError::ImageDecode("image has no pixels".to_string()));
    }

    let max_width = max_width.max(1);
    let scaled = if width > max_width {
        let new_height = ((height as u64 * max_width as u64) / width as u64).max(1) as u32;
        debug!(width, height, max_width, new_height, "Downscaling scan");
        decoded.resize_exact(max_width, new_height, FilterType::Triangle)
    } else {
        decoded
    };

    let rgb = scaled.to_rgb8();
    let (w, h) = rgb.dimensions();
    let mut grey = GrayImage::new(w, h);
    for (x, y, px) in rgb.enumerate_pixels() {
        let sum = px[0] as u16 + px[1] as u16 + px[2] as u16;
        grey.put_pixel(x, y, Luma([(sum / 3) as u8]));
    }
    Ok(grey)
}

/// Accepts raw base64 or a `data:<mime>;base64,` URL and returns the image bytes.
pub fn decode_base64_image(payload: &str) -> Result<Vec<u8>, ExamError> {
    let trimmed = payload.trim();
    let body = match trimmed.split_once(";base64,") {
        Some((prefix, body)) if prefix.starts_with("data:") => body,
        _ => trimmed,
    };
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| ExamError::ImageDecode(format!("invalid base64 image: {e}")))
}
