//! Registration: locating the corner marks and mapping document points to pixels.
//!
//! # Mapping
//! - All four marks found and the 8×8 system solvable → `DocToPixel::Projective`.
//! - Otherwise → `DocToPixel::Affine`, a plain scale of the page onto the image with
//!   the y axis flipped, plus a warning.
//!
//! The choice is made once per scan; sampling only ever calls `apply`.

use image::GrayImage;
use tracing::{debug, warn};

use crate::layout::geometry::{
    Corner, MARK_ARM_PT, MARK_THICKNESS_PT, PAGE_HEIGHT_PT, PAGE_WIDTH_PT,
};
use crate::models::DocPoint;

/// Grey level at or below which a pixel counts as ink when looking for marks.
pub const MARK_DARK_THRESHOLD: u8 = 90;
/// Share of each image dimension searched from every corner.
const CORNER_REGION_FRACTION: f64 = 0.2;
/// A candidate cluster must cover at least this share of the expected L area.
const MIN_MARK_COVERAGE: f64 = 0.35;
const SINGULAR_PIVOT: f64 = 1e-10;

pub const FALLBACK_WARNING: &str =
    "no fiducials detected: full registration unavailable, using scale fallback";

#[derive(Debug, Clone, PartialEq)]
pub enum DocToPixel {
    /// Scale-and-flip of the reference page onto the image.
    Affine { sx: f64, sy: f64, page_h: f64 },
    /// Row-major 3×3 homography with `h[8] == 1`.
    Projective { h: [f64; 9] },
}

impl DocToPixel {
    pub fn scale_fallback(width: u32, height: u32) -> Self {
        DocToPixel::Affine {
            sx: width as f64 / PAGE_WIDTH_PT as f64,
            sy: height as f64 / PAGE_HEIGHT_PT as f64,
            page_h: PAGE_HEIGHT_PT as f64,
        }
    }

    /// Maps a document point (origin bottom-left) to pixel space (origin top-left).
    pub fn apply(&self, p: DocPoint) -> (f64, f64) {
        let (x, y) = (p.x as f64, p.y as f64);
        match self {
            DocToPixel::Affine { sx, sy, page_h } => (x * sx, (page_h - y) * sy),
            DocToPixel::Projective { h } => {
                let w = h[6] * x + h[7] * y + h[8];
                (
                    (h[0] * x + h[1] * y + h[2]) / w,
                    (h[3] * x + h[4] * y + h[5]) / w,
                )
            }
        }
    }

    pub fn is_projective(&self) -> bool {
        matches!(self, DocToPixel::Projective { .. })
    }

    /// Local pixels-per-point around `at`, averaged over both axes.
    pub fn pixels_per_point(&self, at: DocPoint) -> f64 {
        let (x0, y0) = self.apply(at);
        let (x1, y1) = self.apply(DocPoint::new(at.x + 1.0, at.y));
        let (x2, y2) = self.apply(DocPoint::new(at.x, at.y + 1.0));
        let sx = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        let sy = ((x2 - x0).powi(2) + (y2 - y0).powi(2)).sqrt();
        (sx + sy) / 2.0
    }
}

/// Solves the homography taking each `src[i]` to `dst[i]`. `None` when the four
/// correspondences are degenerate.
pub fn solve_homography(src: &[DocPoint; 4], dst: &[(f64, f64); 4]) -> Option<[f64; 9]> {
    let mut system = [[0.0_f64; 9]; 8];
    for (i, (s, &(u, v))) in src.iter().zip(dst.iter()).enumerate() {
        let (x, y) = (s.x as f64, s.y as f64);
        system[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, u];
        system[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, v];
    }
    let sol = gaussian_solve(system)?;
    Some([sol[0], sol[1], sol[2], sol[3], sol[4], sol[5], sol[6], sol[7], 1.0])
}

/// Gaussian elimination with partial pivoting on an augmented 8×9 matrix.
fn gaussian_solve(mut m: [[f64; 9]; 8]) -> Option<[f64; 8]> {
    const N: usize = 8;
    for col in 0..N {
        let pivot_row = (col..N).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot_row][col].abs() < SINGULAR_PIVOT {
            return None;
        }
        m.swap(col, pivot_row);
        for row in col + 1..N {
            let factor = m[row][col] / m[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..=N {
                m[row][k] -= factor * m[col][k];
            }
        }
    }
    let mut x = [0.0_f64; N];
    for row in (0..N).rev() {
        let tail: f64 = (row + 1..N).map(|k| m[row][k] * x[k]).sum();
        x[row] = (m[row][N] - tail) / m[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

// ────────────────────────────────────────────────────────────────────────────
// Mark detection
// ────────────────────────────────────────────────────────────────────────────

fn is_dark(img: &GrayImage, x: u32, y: u32) -> bool {
    img.get_pixel(x, y)[0] <= MARK_DARK_THRESHOLD
}

/// Dark pixel nearest the image corner, ignoring isolated specks.
fn find_seed(img: &GrayImage, corner: Corner, region_w: u32, region_h: u32) -> Option<(u32, u32)> {
    let (w, h) = img.dimensions();
    let (xs, ys) = match corner {
        Corner::TopLeft => (0..region_w, 0..region_h),
        Corner::TopRight => (w - region_w..w, 0..region_h),
        Corner::BottomRight => (w - region_w..w, h - region_h..h),
        Corner::BottomLeft => (0..region_w, h - region_h..h),
    };
    let (cx, cy) = match corner {
        Corner::TopLeft => (0, 0),
        Corner::TopRight => (w - 1, 0),
        Corner::BottomRight => (w - 1, h - 1),
        Corner::BottomLeft => (0, h - 1),
    };

    let mut best: Option<((u32, u32), u64)> = None;
    for y in ys {
        for x in xs.clone() {
            if !is_dark(img, x, y) {
                continue;
            }
            let d = (x.abs_diff(cx) as u64).pow(2) + (y.abs_diff(cy) as u64).pow(2);
            if best.is_some_and(|(_, bd)| bd <= d) {
                continue;
            }
            if dark_neighbours(img, x, y) >= 5 {
                best = Some(((x, y), d));
            }
        }
    }
    best.map(|(p, _)| p)
}

fn dark_neighbours(img: &GrayImage, x: u32, y: u32) -> usize {
    let (w, h) = img.dimensions();
    let mut count = 0;
    for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
            if is_dark(img, nx, ny) {
                count += 1;
            }
        }
    }
    count
}

/// Centroid of the dark cluster forming the L mark at `corner`, in pixels.
pub fn locate_mark(img: &GrayImage, corner: Corner) -> Option<(f64, f64)> {
    let (w, h) = img.dimensions();
    let region_w = ((w as f64 * CORNER_REGION_FRACTION) as u32).clamp(1, w);
    let region_h = ((h as f64 * CORNER_REGION_FRACTION) as u32).clamp(1, h);
    let seed = find_seed(img, corner, region_w, region_h)?;

    // Window spans one arm length inward from the seed, with a little slack outward.
    let ppp = w as f64 / PAGE_WIDTH_PT as f64;
    let reach = ((MARK_ARM_PT as f64 + 3.0) * ppp).ceil() as i64;
    let slack = (2.0 * ppp).ceil() as i64;
    let (dx, dy) = corner.inward();
    let (dx, dy) = (dx as i64, -(dy as i64)); // pixel y grows downward
    let span = |s: i64, dir: i64, limit: u32| {
        let (a, b) = if dir > 0 { (s - slack, s + reach) } else { (s - reach, s + slack) };
        (a.max(0), b.min(limit as i64 - 1))
    };
    let (x0, x1) = span(seed.0 as i64, dx, w);
    let (y0, y1) = span(seed.1 as i64, dy, h);

    let (mut sum_x, mut sum_y, mut count) = (0.0_f64, 0.0_f64, 0u64);
    for y in y0..=y1 {
        for x in x0..=x1 {
            if is_dark(img, x as u32, y as u32) {
                sum_x += x as f64 + 0.5;
                sum_y += y as f64 + 0.5;
                count += 1;
            }
        }
    }

    let (a, t) = (MARK_ARM_PT as f64, MARK_THICKNESS_PT as f64);
    let expected = (2.0 * a * t - t * t) * ppp * ppp;
    if (count as f64) < expected * MIN_MARK_COVERAGE {
        debug!(?corner, count, expected, "Mark cluster too small");
        return None;
    }
    Some((sum_x / count as f64, sum_y / count as f64))
}

/// Resolves the mapping for one scan. `targets` are the document-space reference
/// points of the marks in `Corner::ALL` order.
pub fn register(img: &GrayImage, targets: &[DocPoint; 4]) -> (DocToPixel, Option<&'static str>) {
    let (w, h) = img.dimensions();
    let found: Vec<Option<(f64, f64)>> = Corner::ALL.iter().map(|&c| locate_mark(img, c)).collect();

    let detected: Option<Vec<(f64, f64)>> = found.iter().copied().collect();
    let Some(detected) = detected else {
        let missing: Vec<Corner> = Corner::ALL
            .iter()
            .zip(&found)
            .filter(|(_, f)| f.is_none())
            .map(|(c, _)| *c)
            .collect();
        warn!(?missing, "Corner marks missing; using scale fallback");
        return (DocToPixel::scale_fallback(w, h), Some(FALLBACK_WARNING));
    };
    let dst = [detected[0], detected[1], detected[2], detected[3]];

    if !is_plausible_quad(&dst) {
        warn!(?dst, "Corner marks out of order; using scale fallback");
        return (DocToPixel::scale_fallback(w, h), Some(FALLBACK_WARNING));
    }
    match solve_homography(targets, &dst) {
        Some(hm) => {
            debug!(?dst, "Projective registration resolved");
            (DocToPixel::Projective { h: hm }, None)
        }
        None => {
            warn!("Registration system singular; using scale fallback");
            (DocToPixel::scale_fallback(w, h), Some(FALLBACK_WARNING))
        }
    }
}

/// TL, TR, BR, BL must keep their relative order on the scan.
fn is_plausible_quad(p: &[(f64, f64); 4]) -> bool {
    let [tl, tr, br, bl] = *p;
    tl.0 < tr.0 && bl.0 < br.0 && tl.1 < bl.1 && tr.1 < br.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::geometry::PageGeometry;
    use crate::recovery::synthetic::SyntheticPage;
    use image::Luma;

    const SCALE: f32 = 2.0;

    fn page_with_marks(g: &PageGeometry) -> GrayImage {
        SyntheticPage::blank(*g, SCALE).with_marks().image
    }

    #[test]
    fn test_affine_fallback_flips_y() {
        let m = DocToPixel::scale_fallback(612, 792);
        let (x, y) = m.apply(DocPoint::new(0.0, 792.0));
        assert!(x.abs() < 1e-9 && y.abs() < 1e-9);
        let (x, y) = m.apply(DocPoint::new(612.0, 0.0));
        assert!((x - 612.0).abs() < 1e-9 && (y - 792.0).abs() < 1e-9);
    }

    #[test]
    fn test_homography_reproduces_correspondences() {
        let src = [
            DocPoint::new(40.0, 750.0),
            DocPoint::new(570.0, 752.0),
            DocPoint::new(572.0, 40.0),
            DocPoint::new(38.0, 42.0),
        ];
        let dst = [(90.0, 80.0), (1150.0, 70.0), (1160.0, 1500.0), (85.0, 1490.0)];
        let h = solve_homography(&src, &dst).unwrap();
        let m = DocToPixel::Projective { h };
        for (s, d) in src.iter().zip(dst.iter()) {
            let (u, v) = m.apply(*s);
            assert!((u - d.0).abs() < 1e-6 && (v - d.1).abs() < 1e-6);
        }
    }

    #[test]
    fn test_collinear_points_are_singular() {
        let src = [
            DocPoint::new(0.0, 0.0),
            DocPoint::new(1.0, 1.0),
            DocPoint::new(2.0, 2.0),
            DocPoint::new(3.0, 3.0),
        ];
        let dst = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)];
        assert!(solve_homography(&src, &dst).is_none());
    }

    #[test]
    fn test_marks_located_at_reference_points() {
        let g = PageGeometry::default();
        let img = page_with_marks(&g);
        for corner in Corner::ALL {
            let (px, py) = locate_mark(&img, corner).expect("mark found");
            let r = g.mark_reference(corner);
            let (ex, ey) = (r.x * SCALE, (PAGE_HEIGHT_PT - r.y) * SCALE);
            assert!((px - ex as f64).abs() < 1.5, "{corner:?} x {px} vs {ex}");
            assert!((py - ey as f64).abs() < 1.5, "{corner:?} y {py} vs {ey}");
        }
    }

    #[test]
    fn test_register_resolves_projective_mapping() {
        let g = PageGeometry::default();
        let img = page_with_marks(&g);
        let (mapping, warning) = register(&img, &g.registration_targets());
        assert!(mapping.is_projective());
        assert!(warning.is_none());
        let (x, y) = mapping.apply(DocPoint::new(300.0, 400.0));
        assert!((x - 600.0).abs() < 2.0 && (y - 784.0).abs() < 2.0);
        assert!((mapping.pixels_per_point(DocPoint::new(300.0, 400.0)) - 2.0).abs() < 0.05);
    }

    #[test]
    fn test_blank_scan_falls_back_with_warning() {
        let img = GrayImage::from_pixel(612, 792, Luma([255]));
        let g = PageGeometry::default();
        let (mapping, warning) = register(&img, &g.registration_targets());
        assert!(!mapping.is_projective());
        assert_eq!(warning, Some(FALLBACK_WARNING));
    }
}
