//! QR lookup over the whole scan, upright first and then rotated 180°.
//!
//! The printed code sits in the top-right corner, so where it is found also tells
//! whether the sheet was fed upside down.

use image::imageops;
use image::GrayImage;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrRead {
    pub text: String,
    /// The code was found in the lower-left half, i.e. the scan is upside down.
    pub upside_down: bool,
}

pub fn read_qr(img: &GrayImage) -> Option<QrRead> {
    if let Some((text, in_lower_left)) = decode_grids(img) {
        return Some(QrRead {
            text,
            upside_down: in_lower_left,
        });
    }
    let turned = imageops::rotate180(img);
    decode_grids(&turned).map(|(text, in_lower_left)| QrRead {
        text,
        upside_down: !in_lower_left,
    })
}

/// Returns the first decodable payload and whether its code lies in the lower-left
/// half of `img`.
fn decode_grids(img: &GrayImage) -> Option<(String, bool)> {
    let (w, h) = img.dimensions();
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w as usize, h as usize, |x, y| {
        img.get_pixel(x as u32, y as u32)[0]
    });
    let grids = prepared.detect_grids();
    debug!(grids = grids.len(), "QR grids detected");
    grids.into_iter().find_map(|grid| {
        let (cx, cy) = grid
            .bounds
            .iter()
            .fold((0.0_f64, 0.0_f64), |(sx, sy), p| (sx + p.x as f64 / 4.0, sy + p.y as f64 / 4.0));
        match grid.decode() {
            Ok((_, content)) => Some((content, cx < w as f64 / 2.0 && cy > h as f64 / 2.0)),
            Err(e) => {
                debug!(error = %e, "QR grid failed to decode");
                None
            }
        }
    })
}
