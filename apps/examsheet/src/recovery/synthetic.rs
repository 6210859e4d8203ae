//! Synthetic scans for recovery tests: a white page rasterized at a fixed scale with
//! the same marks, QR and panel ink the PDF renderer prints.

use std::io::Cursor;

use image::{GenericImage, GrayImage, ImageFormat, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use imageproc::rect::Rect;
use qrcode::QrCode;

use crate::layout::geometry::{
    Corner, PageGeometry, MARK_ARM_PT, MARK_THICKNESS_PT, PAGE_HEIGHT_PT, PAGE_WIDTH_PT, QR_SIZE_PT,
};
use crate::layout::question_block::{BUBBLE_RADIUS, FIDUCIAL_SIZE};
use crate::models::{DocPoint, PageCoordinates};

pub struct SyntheticPage {
    pub geometry: PageGeometry,
    pub scale: f32,
    pub image: GrayImage,
}

impl SyntheticPage {
    pub fn blank(geometry: PageGeometry, scale: f32) -> Self {
        let w = (PAGE_WIDTH_PT * scale).round() as u32;
        let h = (PAGE_HEIGHT_PT * scale).round() as u32;
        Self {
            geometry,
            scale,
            image: GrayImage::from_pixel(w, h, Luma([255])),
        }
    }

    pub fn to_px(&self, p: DocPoint) -> (f32, f32) {
        (p.x * self.scale, (PAGE_HEIGHT_PT - p.y) * self.scale)
    }

    /// Fills the doc-space rectangle whose top-left corner is `(x, y_top)`.
    fn fill_rect(&mut self, x: f32, y_top: f32, w: f32, h: f32) {
        let (px, py) = self.to_px(DocPoint::new(x, y_top));
        let rect = Rect::at(px.round() as i32, py.round() as i32)
            .of_size((w * self.scale).round() as u32, (h * self.scale).round() as u32);
        draw_filled_rect_mut(&mut self.image, rect, Luma([0]));
    }

    pub fn with_marks(mut self) -> Self {
        let (a, t) = (MARK_ARM_PT, MARK_THICKNESS_PT);
        for corner in Corner::ALL {
            let v = self.geometry.mark_vertex(corner);
            let (dx, dy) = corner.inward();
            for (rw, rh) in [(a, t), (t, a)] {
                let x0 = if dx > 0.0 { v.x } else { v.x - rw };
                let y_top = if dy > 0.0 { v.y + rh } else { v.y };
                self.fill_rect(x0, y_top, rw, rh);
            }
        }
        self
    }

    pub fn with_qr(mut self, payload: &str) -> Self {
        let code = QrCode::new(payload.as_bytes()).unwrap();
        let modules = code.width() as u32 + 8;
        let module_px = ((QR_SIZE_PT * self.scale) as u32 / modules).max(1);
        let qr = code
            .render::<Luma<u8>>()
            .module_dimensions(module_px, module_px)
            .build();
        let origin = self.geometry.qr_origin();
        let (x, y) = self.to_px(DocPoint::new(origin.x, origin.y + QR_SIZE_PT));
        self.image
            .copy_from(&qr, x.round() as u32, y.round() as u32)
            .unwrap();
        self
    }

    /// Prints every panel of `page`: bubble outlines and fiducial squares.
    pub fn with_panels(mut self, page: &PageCoordinates) -> Self {
        for q in &page.questions {
            for b in &q.bubbles {
                let (px, py) = self.to_px(DocPoint::new(b.x, b.y));
                let r = (BUBBLE_RADIUS * self.scale).round() as i32;
                draw_hollow_circle_mut(&mut self.image, (px.round() as i32, py.round() as i32), r, Luma([0]));
            }
            for f in q.fiducials.into_iter().flatten() {
                let half = FIDUCIAL_SIZE / 2.0;
                self.fill_rect(f.x - half, f.y + half, FIDUCIAL_SIZE, FIDUCIAL_SIZE);
            }
        }
        self
    }

    /// Pencils in the bubble for `letter` on question `number`.
    pub fn with_answer(mut self, page: &PageCoordinates, number: u32, letter: char) -> Self {
        let bubble = page
            .questions
            .iter()
            .find(|q| q.number == number)
            .and_then(|q| q.bubbles.iter().find(|b| b.letter == letter))
            .unwrap();
        let (px, py) = self.to_px(DocPoint::new(bubble.x, bubble.y));
        let r = ((BUBBLE_RADIUS - 0.5) * self.scale).round() as i32;
        draw_filled_circle_mut(&mut self.image, (px.round() as i32, py.round() as i32), r, Luma([25]));
        self
    }

    /// Distorts the scan so the image corners TL, TR, BR, BL land on `corners`.
    pub fn warped(mut self, corners: [(f32, f32); 4]) -> Self {
        let (w, h) = self.image.dimensions();
        let (w, h) = (w as f32, h as f32);
        let from = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
        let projection = Projection::from_control_points(from, corners).unwrap();
        self.image = warp(&self.image, &projection, Interpolation::Bilinear, Luma([255]));
        self
    }

    /// Rotates the scan by `theta` radians about the image center.
    pub fn rotated(self, theta: f32) -> Self {
        let (w, h) = self.image.dimensions();
        let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
        let (sin, cos) = theta.sin_cos();
        let turn = |(x, y): (f32, f32)| {
            let (dx, dy) = (x - cx, y - cy);
            (cx + dx * cos - dy * sin, cy + dx * sin + dy * cos)
        };
        let (w, h) = (w as f32, h as f32);
        self.warped([turn((0.0, 0.0)), turn((w, 0.0)), turn((w, h)), turn((0.0, h))])
    }

    pub fn png(&self) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        self.image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }
}
