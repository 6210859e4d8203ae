// Recovery Engine: reads one scanned page back into detected answers.
// Only an undecodable image or a malformed page map is an error; every other
// problem with the scan ends up in `RecoveryResult::warnings`.

pub mod qr;
pub mod raster;
pub mod registration;
pub mod sampling;
#[cfg(test)]
pub(crate) mod synthetic;

use image::imageops;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::ExamError;
use crate::layout::geometry::PageGeometry;
use crate::models::{CoordinateMap, DocPoint, PageCoordinates, RecoveryResult};

pub use raster::decode_base64_image;
pub use registration::DocToPixel;

pub const NO_QR_WARNING: &str = "no QR detected";
pub const QR_MISMATCH_WARNING: &str = "QR does not match expected exam";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOptions {
    /// Margin the sheet was printed with; used when the page map carries no marks.
    pub margin_mm: f32,
    /// Scans wider than this are downscaled before any processing.
    pub max_width: u32,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            margin_mm: 12.0,
            max_width: 1600,
        }
    }
}

/// Detects the answers on one scanned page.
///
/// When `expected_identifier` is given it is compared against the page's QR payload;
/// a mismatch is reported as a warning, never as an error.
pub fn recover_answers(
    raw_image: &[u8],
    page: &PageCoordinates,
    expected_identifier: Option<&str>,
    options: &RecoveryOptions,
) -> Result<RecoveryResult, ExamError> {
    page.validate()?;
    let mut img = raster::decode_scan(raw_image, options.max_width)?;
    let mut warnings = Vec::new();

    let qr = qr::read_qr(&img);
    match &qr {
        None => {
            warn!(page = page.page_number, "No QR found on scan");
            warnings.push(NO_QR_WARNING.to_string());
        }
        Some(read) => {
            if let Some(expected) = expected_identifier {
                if read.text.trim() != expected.trim() {
                    warn!(found = %read.text, expected, "QR mismatch");
                    warnings.push(QR_MISMATCH_WARNING.to_string());
                }
            }
            if read.upside_down {
                info!(page = page.page_number, "Scan is upside down; rotating");
                img = imageops::rotate180(&img);
            }
        }
    }

    let targets = registration_targets(page, options);
    let (mapping, registration_warning) = registration::register(&img, &targets);
    if let Some(w) = registration_warning {
        warnings.push(w.to_string());
    }

    let mut questions: Vec<_> = page.questions.iter().collect();
    questions.sort_by_key(|q| q.number);

    let mut answers = Vec::with_capacity(questions.len());
    for q in questions {
        let (answer, marked) = sampling::detect_question(&img, &mapping, q);
        if marked.len() >= 2 {
            warnings.push(format!("multiple marks on question {}", q.number));
        }
        answers.push(answer);
    }

    info!(
        page = page.page_number,
        answered = answers.iter().filter(|a| a.opinion.is_some()).count(),
        total = answers.len(),
        projective = mapping.is_projective(),
        warnings = warnings.len(),
        "Scan recovered"
    );
    Ok(RecoveryResult {
        answers,
        warnings,
        qr_text: qr.map(|r| r.text),
    })
}

/// Looks up `page_number` in `map` and recovers it against that page's identifier.
pub fn recover_page(
    raw_image: &[u8],
    map: &CoordinateMap,
    page_number: u32,
    options: &RecoveryOptions,
) -> Result<RecoveryResult, ExamError> {
    let page = map.page(page_number)?;
    recover_answers(raw_image, page, Some(&page.identifier), options)
}

fn registration_targets(page: &PageCoordinates, options: &RecoveryOptions) -> [DocPoint; 4] {
    match page.registration_marks.as_slice() {
        [a, b, c, d] => [*a, *b, *c, *d],
        _ => PageGeometry::from_margin_mm(options.margin_mm).registration_targets(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::generate_variant;
    use crate::layout::{plan_exam, RenderOptions};
    use crate::models::{Choice, ExamMeta, Question};
    use crate::recovery::sampling::ACCEPTANCE_THRESHOLD;
    use crate::recovery::synthetic::SyntheticPage;

    fn planned_map(count: usize) -> CoordinateMap {
        let questions: Vec<Question> = (0..count)
            .map(|i| Question {
                id: format!("q{i}"),
                statement: format!("Which line compiles? ({i})"),
                image: None,
                choices: (0..5)
                    .map(|c| Choice {
                        text: format!("choice {c}"),
                        is_correct: c == 2,
                    })
                    .collect(),
            })
            .collect();
        let variant = generate_variant(&questions);
        let meta = ExamMeta {
            institution: "Institute".into(),
            title: "Quiz".into(),
            ..Default::default()
        };
        plan_exam(&meta, "RT01", &questions, &variant, &RenderOptions::default())
            .unwrap()
            .coordinate_map()
    }

    fn printed(page: &PageCoordinates) -> SyntheticPage {
        SyntheticPage::blank(PageGeometry::default(), 2.0)
            .with_marks()
            .with_qr(&page.identifier)
            .with_panels(page)
    }

    #[test]
    fn test_round_trip_recovers_marked_letter() {
        let map = planned_map(3);
        let page = map.page(1).unwrap();
        let scan = printed(page).with_answer(page, 2, 'D').png();

        let result = recover_answers(&scan, page, Some(&page.identifier), &RecoveryOptions::default()).unwrap();
        assert_eq!(result.qr_text.as_deref(), Some("EXAM:RT01:P1"));
        assert!(result.warnings.is_empty(), "unexpected warnings: {:?}", result.warnings);
        assert_eq!(result.answers.len(), 3);
        let q2 = &result.answers[1];
        assert_eq!(q2.question_number, 2);
        assert_eq!(q2.opinion, Some('D'));
        assert!(q2.confidence > ACCEPTANCE_THRESHOLD);
        assert_eq!(result.answers[0].opinion, None);
        assert_eq!(result.answers[2].opinion, None);
    }

    #[test]
    fn test_white_image_degrades_gracefully() {
        let map = planned_map(4);
        let page = map.page(1).unwrap();
        let scan = SyntheticPage::blank(PageGeometry::default(), 2.0).png();

        let result = recover_answers(&scan, page, Some(&page.identifier), &RecoveryOptions::default()).unwrap();
        assert_eq!(result.qr_text, None);
        assert!(result.warnings.iter().any(|w| w == NO_QR_WARNING));
        assert!(result.warnings.iter().any(|w| w.starts_with("no fiducials detected")));
        assert_eq!(result.answers.len(), 4);
        assert!(result.answers.iter().all(|a| a.opinion.is_none()));
    }

    #[test]
    fn test_qr_mismatch_is_a_warning() {
        let map = planned_map(2);
        let page = map.page(1).unwrap();
        let scan = printed(page).with_answer(page, 1, 'A').png();

        let result = recover_answers(&scan, page, Some("EXAM:OTHER:P1"), &RecoveryOptions::default()).unwrap();
        assert!(result.warnings.iter().any(|w| w == QR_MISMATCH_WARNING));
        assert_eq!(result.answers[0].opinion, Some('A'));
    }

    #[test]
    fn test_upside_down_scan_is_recovered() {
        let map = planned_map(3);
        let page = map.page(1).unwrap();
        let sheet = printed(page).with_answer(page, 3, 'B');
        let turned = SyntheticPage {
            image: imageops::rotate180(&sheet.image),
            ..sheet
        };

        let result = recover_answers(&turned.png(), page, Some(&page.identifier), &RecoveryOptions::default()).unwrap();
        assert_eq!(result.answers[2].opinion, Some('B'));
    }

    #[test]
    fn test_double_mark_warns() {
        let map = planned_map(2);
        let page = map.page(1).unwrap();
        let scan = printed(page)
            .with_answer(page, 1, 'A')
            .with_answer(page, 1, 'C')
            .png();

        let result = recover_answers(&scan, page, Some(&page.identifier), &RecoveryOptions::default()).unwrap();
        assert!(result.warnings.iter().any(|w| w == "multiple marks on question 1"));
    }

    #[test]
    fn test_no_expected_identifier_skips_qr_comparison() {
        let map = planned_map(2);
        let page = map.page(1).unwrap();
        let scan = printed(page).with_answer(page, 2, 'E').png();

        let result = recover_answers(&scan, page, None, &RecoveryOptions::default()).unwrap();
        assert_eq!(result.qr_text.as_deref(), Some("EXAM:RT01:P1"));
        assert!(!result.warnings.iter().any(|w| w == QR_MISMATCH_WARNING));
        assert_eq!(result.answers[1].opinion, Some('E'));
    }

    fn marked_sheet(page: &PageCoordinates) -> SyntheticPage {
        printed(page)
            .with_answer(page, 1, 'B')
            .with_answer(page, 3, 'A')
            .with_answer(page, 4, 'E')
    }

    fn opinions(result: &RecoveryResult) -> Vec<Option<char>> {
        result.answers.iter().map(|a| a.opinion).collect()
    }

    #[test]
    fn test_rotated_scan_is_registered() {
        let map = planned_map(4);
        let page = map.page(1).unwrap();
        let scan = marked_sheet(page).rotated(0.03).png();

        let result = recover_answers(&scan, page, Some(&page.identifier), &RecoveryOptions::default()).unwrap();
        assert!(result.warnings.is_empty(), "unexpected warnings: {:?}", result.warnings);
        assert_eq!(opinions(&result), vec![Some('B'), None, Some('A'), Some('E')]);
    }

    #[test]
    fn test_keystoned_scan_is_registered() {
        let map = planned_map(4);
        let page = map.page(1).unwrap();
        let sheet = marked_sheet(page);
        let (w, h) = sheet.image.dimensions();
        let (w, h) = (w as f32, h as f32);
        let scan = sheet
            .warped([(40.0, 20.0), (w - 40.0, 20.0), (w, h), (0.0, h)])
            .png();

        let result = recover_answers(&scan, page, Some(&page.identifier), &RecoveryOptions::default()).unwrap();
        assert!(
            !result.warnings.iter().any(|w| w == registration::FALLBACK_WARNING),
            "registration fell back: {:?}",
            result.warnings
        );
        assert_eq!(opinions(&result), vec![Some('B'), None, Some('A'), Some('E')]);
    }

    #[test]
    fn test_missing_marks_use_fallback_and_still_read_answers() {
        let map = planned_map(4);
        let page = map.page(1).unwrap();
        let scan = SyntheticPage::blank(PageGeometry::default(), 2.0)
            .with_qr(&page.identifier)
            .with_panels(page)
            .with_answer(page, 1, 'B')
            .with_answer(page, 3, 'A')
            .png();

        let result = recover_answers(&scan, page, Some(&page.identifier), &RecoveryOptions::default()).unwrap();
        assert!(result.warnings.iter().any(|w| w == registration::FALLBACK_WARNING));
        assert_eq!(opinions(&result), vec![Some('B'), None, Some('A'), None]);
    }

    #[test]
    fn test_undecodable_image_is_an_error() {
        let map = planned_map(1);
        let err = recover_page(b"\x00\x01garbage", &map, 1, &RecoveryOptions::default()).unwrap_err();
        assert!(matches!(err, ExamError::ImageDecode(_)));
    }

    #[test]
    fn test_missing_page_is_an_error() {
        let map = planned_map(1);
        let scan = SyntheticPage::blank(PageGeometry::default(), 1.0).png();
        let err = recover_page(&scan, &map, 9, &RecoveryOptions::default()).unwrap_err();
        assert!(matches!(err, ExamError::MissingPage(9)));
    }
}
