//! Fixed page geometry shared by the layout and recovery engines.
//!
//! Everything is in document points, origin bottom-left. Recovery rebuilds the same
//! geometry from the margin alone, so nothing here may depend on content.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::DocPoint;

/// US letter.
pub const PAGE_WIDTH_PT: f32 = 612.0;
pub const PAGE_HEIGHT_PT: f32 = 792.0;

pub const MIN_MARGIN_MM: f32 = 4.0;
pub const MAX_MARGIN_MM: f32 = 30.0;

/// Arm length and stroke thickness of the L-shaped corner marks.
pub const MARK_ARM_PT: f32 = 18.0;
pub const MARK_THICKNESS_PT: f32 = 4.0;
/// Content keeps this distance from the corner mark vertices.
pub const MARK_CLEARANCE_PT: f32 = 26.0;

pub const QR_SIZE_PT: f32 = 64.0;
/// Horizontal gap between the QR's right edge and the top-right mark vertex.
pub const QR_RIGHT_INSET_PT: f32 = 32.0;
pub const QR_CAPTION_SIZE_PT: f32 = 6.0;

pub fn mm_to_pt(mm: f32) -> f32 {
    mm * 72.0 / 25.4
}

pub fn pt_to_mm(pt: f32) -> f32 {
    pt * 25.4 / 72.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];

    /// Direction the mark's arms point, towards the page interior.
    pub fn inward(self) -> (f32, f32) {
        match self {
            Corner::TopLeft => (1.0, -1.0),
            Corner::TopRight => (-1.0, -1.0),
            Corner::BottomRight => (-1.0, 1.0),
            Corner::BottomLeft => (1.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub margin_pt: f32,
}

impl PageGeometry {
    /// Builds the geometry for a margin in millimeters, clamped to a printable range.
    pub fn from_margin_mm(margin_mm: f32) -> Self {
        let clamped = if margin_mm.is_finite() {
            margin_mm.clamp(MIN_MARGIN_MM, MAX_MARGIN_MM)
        } else {
            MIN_MARGIN_MM
        };
        if (clamped - margin_mm).abs() > f32::EPSILON {
            warn!(requested = margin_mm, used = clamped, "Margin clamped to printable range");
        }
        Self {
            margin_pt: mm_to_pt(clamped),
        }
    }

    pub fn width(&self) -> f32 {
        PAGE_WIDTH_PT
    }

    pub fn height(&self) -> f32 {
        PAGE_HEIGHT_PT
    }

    pub fn content_left(&self) -> f32 {
        self.margin_pt
    }

    pub fn content_right(&self) -> f32 {
        PAGE_WIDTH_PT - self.margin_pt
    }

    pub fn content_width(&self) -> f32 {
        self.content_right() - self.content_left()
    }

    pub fn content_bottom(&self) -> f32 {
        self.margin_pt + MARK_CLEARANCE_PT
    }

    /// Top of the header block on page 1.
    pub fn first_page_top(&self) -> f32 {
        PAGE_HEIGHT_PT - self.margin_pt - MARK_CLEARANCE_PT
    }

    /// Top of the question area on pages after the first, below the QR and caption.
    pub fn continuation_top(&self) -> f32 {
        self.qr_origin().y - QR_CAPTION_SIZE_PT - 10.0
    }

    /// Bottom-left corner of the QR square.
    pub fn qr_origin(&self) -> DocPoint {
        DocPoint::new(
            PAGE_WIDTH_PT - self.margin_pt - QR_RIGHT_INSET_PT - QR_SIZE_PT,
            PAGE_HEIGHT_PT - self.margin_pt - QR_SIZE_PT,
        )
    }

    pub fn footer_baseline(&self) -> f32 {
        self.margin_pt + 6.0
    }

    /// Vertex of the L mark for `corner`, at the margin inset.
    pub fn mark_vertex(&self, corner: Corner) -> DocPoint {
        let m = self.margin_pt;
        match corner {
            Corner::TopLeft => DocPoint::new(m, PAGE_HEIGHT_PT - m),
            Corner::TopRight => DocPoint::new(PAGE_WIDTH_PT - m, PAGE_HEIGHT_PT - m),
            Corner::BottomRight => DocPoint::new(PAGE_WIDTH_PT - m, m),
            Corner::BottomLeft => DocPoint::new(m, m),
        }
    }

    /// Center of mass of the inked L shape. This is what a dark-pixel centroid finds
    /// on a scan, so registration maps these points rather than the vertices.
    pub fn mark_reference(&self, corner: Corner) -> DocPoint {
        let a = MARK_ARM_PT;
        let t = MARK_THICKNESS_PT;
        let offset = (a * a + (a - t) * t) / (2.0 * (2.0 * a - t));
        let vertex = self.mark_vertex(corner);
        let (dx, dy) = corner.inward();
        DocPoint::new(vertex.x + dx * offset, vertex.y + dy * offset)
    }

    /// Reference points in `Corner::ALL` order.
    pub fn registration_targets(&self) -> [DocPoint; 4] {
        Corner::ALL.map(|c| self.mark_reference(c))
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::from_margin_mm(12.0)
    }
}
