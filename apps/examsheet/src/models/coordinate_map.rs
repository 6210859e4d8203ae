//! The data contract between generation and recovery.
//!
//! All coordinates are document points (1/72 in) with the origin at the bottom-left
//! corner of the page, independent of any print or scan DPI. A map is written once at
//! generation time and only ever read afterwards.

use serde::{Deserialize, Serialize};

use crate::errors::ExamError;
use crate::models::question::CHOICES_PER_QUESTION;

const IDENTIFIER_PREFIX: &str = "EXAM:";

/// QR payload printed on every page. Previously printed sheets carry this format
/// permanently, so it must stay readable by `parse_exam_identifier`.
pub fn exam_identifier(folio: &str, page_number: u32) -> String {
    format!("{IDENTIFIER_PREFIX}{folio}:P{page_number}")
}

/// Splits `EXAM:<folio>:P<page>` back into `(folio, page)`.
pub fn parse_exam_identifier(payload: &str) -> Option<(String, u32)> {
    let rest = payload.trim().strip_prefix(IDENTIFIER_PREFIX)?;
    let (folio, page) = rest.rsplit_once(":P")?;
    if folio.is_empty() {
        return None;
    }
    let page = page.parse::<u32>().ok().filter(|p| *p >= 1)?;
    Some((folio.to_string(), page))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocPoint {
    pub x: f32,
    pub y: f32,
}

impl DocPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Center of one answer bubble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubbleCoordinate {
    pub letter: char,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionCoordinates {
    /// 1-based number printed next to the question.
    pub number: u32,
    pub question_id: String,
    /// One entry per rendered choice, in letter order.
    pub bubbles: Vec<BubbleCoordinate>,
    /// Centers of the top and bottom fiducial squares of the answer panel.
    #[serde(default)]
    pub fiducials: Option<[DocPoint; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCoordinates {
    pub page_number: u32,
    pub identifier: String,
    /// Reference points of the corner marks: top-left, top-right, bottom-right, bottom-left.
    #[serde(default)]
    pub registration_marks: Vec<DocPoint>,
    pub questions: Vec<QuestionCoordinates>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinateMap {
    pub folio: String,
    pub pages: Vec<PageCoordinates>,
}

impl CoordinateMap {
    /// Looks up one page. A missing page is malformed input for recovery.
    pub fn page(&self, page_number: u32) -> Result<&PageCoordinates, ExamError> {
        self.pages
            .iter()
            .find(|p| p.page_number == page_number)
            .ok_or(ExamError::MissingPage(page_number))
    }

    pub fn question_count(&self) -> usize {
        self.pages.iter().map(|p| p.questions.len()).sum()
    }
}

impl PageCoordinates {
    /// Structural checks run before any pixel is sampled.
    pub fn validate(&self) -> Result<(), ExamError> {
        if !self.registration_marks.is_empty() && self.registration_marks.len() != 4 {
            return Err(ExamError::InvalidCoordinateMap(format!(
                "page {} has {} registration marks, expected 4",
                self.page_number,
                self.registration_marks.len()
            )));
        }
        for q in &self.questions {
            if q.bubbles.is_empty() {
                return Err(ExamError::InvalidCoordinateMap(format!(
                    "question {} has no bubbles",
                    q.number
                )));
            }
            if q.bubbles.len() > CHOICES_PER_QUESTION {
                return Err(ExamError::InvalidCoordinateMap(format!(
                    "question {} has {} bubbles, at most {CHOICES_PER_QUESTION} are printed",
                    q.number,
                    q.bubbles.len()
                )));
            }
            for (i, b) in q.bubbles.iter().enumerate() {
                let expected = char::from(b'A' + i as u8);
                if b.letter != expected {
                    return Err(ExamError::InvalidCoordinateMap(format!(
                        "question {} bubble {} is '{}', expected '{}'",
                        q.number, i, b.letter, expected
                    )));
                }
                if !b.x.is_finite() || !b.y.is_finite() {
                    return Err(ExamError::InvalidCoordinateMap(format!(
                        "question {} bubble {} has a non-finite coordinate",
                        q.number, b.letter
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One generated page as recorded for the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDescriptor {
    pub page_number: u32,
    pub identifier: String,
    /// Inclusive question-number range; both `None` when the page holds no question.
    pub first_question: Option<u32>,
    pub last_question: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bubble(letter: char) -> BubbleCoordinate {
        BubbleCoordinate {
            letter,
            x: 100.0,
            y: 200.0,
        }
    }

    fn page_with(bubbles: Vec<BubbleCoordinate>) -> PageCoordinates {
        PageCoordinates {
            page_number: 1,
            identifier: exam_identifier("F1", 1),
            registration_marks: vec![],
            questions: vec![QuestionCoordinates {
                number: 1,
                question_id: "q".into(),
                bubbles,
                fiducials: None,
            }],
        }
    }

    #[test]
    fn test_identifier_format() {
        assert_eq!(exam_identifier("A7X2", 3), "EXAM:A7X2:P3");
    }

    #[test]
    fn test_parse_identifier_round_trip() {
        let id = exam_identifier("2026-FIN:07", 12);
        assert_eq!(parse_exam_identifier(&id), Some(("2026-FIN:07".to_string(), 12)));
    }

    #[test]
    fn test_parse_identifier_rejects_foreign_payloads() {
        assert_eq!(parse_exam_identifier("https://example.com"), None);
        assert_eq!(parse_exam_identifier("EXAM::P1"), None);
        assert_eq!(parse_exam_identifier("EXAM:F1:P0"), None);
        assert_eq!(parse_exam_identifier("EXAM:F1:Px"), None);
    }

    #[test]
    fn test_missing_page_is_error() {
        let map = CoordinateMap {
            folio: "F1".into(),
            pages: vec![page_with(vec![bubble('A')])],
        };
        assert!(map.page(1).is_ok());
        assert!(matches!(map.page(2), Err(ExamError::MissingPage(2))));
    }

    #[test]
    fn test_validate_rejects_out_of_order_letters() {
        let page = page_with(vec![bubble('A'), bubble('C')]);
        assert!(matches!(
            page.validate(),
            Err(ExamError::InvalidCoordinateMap(_))
        ));
    }

    #[test]
    fn test_validate_rejects_oversized_bubble_list() {
        let bubbles = (0..300).map(|_| bubble('A')).collect();
        let page = page_with(bubbles);
        assert!(matches!(
            page.validate(),
            Err(ExamError::InvalidCoordinateMap(ref m)) if m.contains("300 bubbles")
        ));
    }

    #[test]
    fn test_letter_serializes_as_string() {
        let json = serde_json::to_value(bubble('D')).unwrap();
        assert_eq!(json["letter"], "D");
    }
}
