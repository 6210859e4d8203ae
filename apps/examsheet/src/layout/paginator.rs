//! Pagination: places measured question blocks onto pages and derives the coordinate
//! map from the placement.
//!
//! # Rules
//! - A block that does not fit below the cursor opens a new page.
//! - Page 1 never keeps a block it cannot fit; later pages place an oversized block
//!   alone and overflow, so pagination always terminates.
//! - No block is ever split.
//! - Trailing empty pages are appended until `min_pages` is reached.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ExamError;
use crate::layout::assets::{prepare_assets, ExamAssets};
use crate::layout::geometry::PageGeometry;
use crate::layout::header::{fit_instructions, layout_header, HeaderLayout, InstructionsLayout};
use crate::layout::question_block::{layout_question, QuestionLayout};
use crate::models::{
    exam_identifier, CoordinateMap, ExamMeta, PageCoordinates, PageDescriptor, Question, VariantMap,
};

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Minimum number of pages in the output; extra pages are left blank.
    pub min_pages: u32,
    pub margin_mm: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            min_pages: 1,
            margin_mm: 12.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedQuestion {
    /// Page y of the block's top edge.
    pub top_y: f32,
    pub layout: QuestionLayout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    pub page_number: u32,
    pub questions: Vec<PlacedQuestion>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedInstructions {
    pub top_y: f32,
    pub layout: InstructionsLayout,
}

/// Complete geometry of one exam. Drawing and the coordinate map both read from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamLayout {
    pub geometry: PageGeometry,
    pub folio: String,
    pub header: HeaderLayout,
    pub instructions: Option<PlacedInstructions>,
    pub pages: Vec<PagePlan>,
    pub warnings: Vec<String>,
}

impl ExamLayout {
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn coordinate_map(&self) -> CoordinateMap {
        let marks = self.geometry.registration_targets().to_vec();
        CoordinateMap {
            folio: self.folio.clone(),
            pages: self
                .pages
                .iter()
                .map(|page| PageCoordinates {
                    page_number: page.page_number,
                    identifier: exam_identifier(&self.folio, page.page_number),
                    registration_marks: marks.clone(),
                    questions: page
                        .questions
                        .iter()
                        .map(|p| p.layout.coordinates(p.top_y))
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn page_descriptors(&self) -> Vec<PageDescriptor> {
        self.pages
            .iter()
            .map(|page| PageDescriptor {
                page_number: page.page_number,
                identifier: exam_identifier(&self.folio, page.page_number),
                first_question: page.questions.first().map(|p| p.layout.number),
                last_question: page.questions.last().map(|p| p.layout.number),
            })
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Core functions
// ────────────────────────────────────────────────────────────────────────────

/// Checks every question's own invariants and that `variant` covers `questions` exactly.
pub fn validate_inputs(questions: &[Question], variant: &VariantMap) -> Result<(), ExamError> {
    for q in questions {
        q.validate()?;
    }
    variant.validate_against(questions)?;
    if variant.ordered_question_ids.len() != questions.len() {
        return Err(ExamError::InvalidVariant(format!(
            "variant orders {} questions, {} were supplied",
            variant.ordered_question_ids.len(),
            questions.len()
        )));
    }
    Ok(())
}

/// Computes the full exam geometry without producing a document.
pub fn plan_exam(
    meta: &ExamMeta,
    folio: &str,
    questions: &[Question],
    variant: &VariantMap,
    options: &RenderOptions,
) -> Result<ExamLayout, ExamError> {
    validate_inputs(questions, variant)?;
    let assets = prepare_assets(meta, questions);
    plan_with_assets(meta, folio, questions, variant, &assets, options)
}

/// Same as `plan_exam`, over images that were already decoded.
pub fn plan_with_assets(
    meta: &ExamMeta,
    folio: &str,
    questions: &[Question],
    variant: &VariantMap,
    assets: &ExamAssets,
    options: &RenderOptions,
) -> Result<ExamLayout, ExamError> {
    validate_inputs(questions, variant)?;
    let geometry = PageGeometry::from_margin_mm(options.margin_mm);
    let mut warnings = assets.warnings.clone();

    let header = layout_header(
        &geometry,
        meta,
        assets.left_logo.as_ref().map(|i| i.dimensions()),
        assets.right_logo.as_ref().map(|i| i.dimensions()),
    );
    let mut cursor = geometry.first_page_top() - header.height;

    let mut force_break = false;
    let instructions = meta
        .instructions
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .map(|text| {
            let layout = fit_instructions(&geometry, text, cursor - geometry.content_bottom());
            if layout.overflow {
                warn!(height = layout.height, "Instructions overflow page 1; questions start on page 2");
                warnings.push("instructions do not fit on page 1 at the smallest size".to_string());
                force_break = true;
            }
            let placed = PlacedInstructions {
                top_y: cursor,
                layout,
            };
            cursor -= placed.layout.height;
            placed
        });

    let mut pages = vec![PagePlan {
        page_number: 1,
        questions: Vec::new(),
    }];

    for (index, id) in variant.ordered_question_ids.iter().enumerate() {
        let number = index as u32 + 1;
        let question = questions
            .iter()
            .find(|q| &q.id == id)
            .ok_or_else(|| ExamError::InvalidVariant(format!("question {id} is not in the question set")))?;
        let order = variant
            .option_order(id)
            .ok_or_else(|| ExamError::InvalidVariant(format!("question {id} has no option order")))?;

        let block = layout_question(&geometry, number, question, order, assets.question_image_px(id));

        let page = pages.len() as u32;
        let fits = block.height <= cursor - geometry.content_bottom();
        let page_is_empty = pages.last().is_some_and(|p| p.questions.is_empty());
        if force_break || (!fits && (!page_is_empty || page == 1)) {
            pages.push(PagePlan {
                page_number: page + 1,
                questions: Vec::new(),
            });
            cursor = geometry.continuation_top();
            force_break = false;
        }

        if block.height > cursor - geometry.content_bottom() {
            warn!(question = number, height = block.height, "Question taller than a page; placed alone");
            warnings.push(format!("question {number} is taller than a page and overflows"));
        }

        let top_y = cursor;
        cursor -= block.height;
        if let Some(current) = pages.last_mut() {
            current.questions.push(PlacedQuestion { top_y, layout: block });
        }
    }

    while (pages.len() as u32) < options.min_pages {
        pages.push(PagePlan {
            page_number: pages.len() as u32 + 1,
            questions: Vec::new(),
        });
    }

    let layout = ExamLayout {
        geometry,
        folio: folio.to_string(),
        header,
        instructions,
        pages,
        warnings,
    };

    for page in &layout.pages {
        debug!(page = page.page_number, questions = page.questions.len(), "Page planned");
    }
    info!(
        folio,
        pages = layout.page_count(),
        questions = variant.ordered_question_ids.len(),
        "Exam planned"
    );
    Ok(layout)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::generate_variant;
    use crate::models::Choice;

    fn make_questions(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| Question {
                id: format!("q{i}"),
                statement: format!("Question {i}: which value does `x.len()` return here?"),
                image: None,
                choices: (0..5)
                    .map(|c| Choice {
                        text: format!("option {c} for {i}"),
                        is_correct: c == 1,
                    })
                    .collect(),
            })
            .collect()
    }

    fn meta() -> ExamMeta {
        ExamMeta {
            institution: "Institute".into(),
            title: "Final".into(),
            instructions: Some("Fill exactly one bubble per question.".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_every_question_placed_once_in_order() {
        let questions = make_questions(60);
        let variant = generate_variant(&questions);
        let layout = plan_exam(&meta(), "F60", &questions, &variant, &RenderOptions::default()).unwrap();
        let numbers: Vec<u32> = layout
            .pages
            .iter()
            .flat_map(|p| p.questions.iter().map(|q| q.layout.number))
            .collect();
        assert_eq!(numbers, (1..=60).collect::<Vec<u32>>());
        assert!(layout.page_count() > 1);
        let map = layout.coordinate_map();
        assert_eq!(map.question_count(), 60);
        for page in &map.pages {
            assert_eq!(page.registration_marks.len(), 4);
            for q in &page.questions {
                assert_eq!(q.bubbles.len(), 5);
            }
        }
    }

    #[test]
    fn test_blocks_stay_inside_content_area() {
        let questions = make_questions(30);
        let variant = generate_variant(&questions);
        let layout = plan_exam(&meta(), "F", &questions, &variant, &RenderOptions::default()).unwrap();
        let g = layout.geometry;
        for page in &layout.pages {
            let top = if page.page_number == 1 {
                g.first_page_top()
            } else {
                g.continuation_top()
            };
            for q in &page.questions {
                assert!(q.top_y <= top + 1e-3);
                assert!(q.top_y - q.layout.height >= g.content_bottom() - 1e-3);
            }
        }
    }

    #[test]
    fn test_min_pages_adds_blank_pages() {
        let questions = make_questions(2);
        let variant = generate_variant(&questions);
        let options = RenderOptions {
            min_pages: 4,
            ..Default::default()
        };
        let layout = plan_exam(&meta(), "F", &questions, &variant, &options).unwrap();
        let descriptors = layout.page_descriptors();
        assert_eq!(descriptors.len(), 4);
        assert_eq!(descriptors[0].first_question, Some(1));
        assert_eq!(descriptors[0].last_question, Some(2));
        assert_eq!(descriptors[3].first_question, None);
        assert_eq!(descriptors[3].identifier, "EXAM:F:P4");
    }

    #[test]
    fn test_oversized_question_placed_alone_and_terminates() {
        let mut questions = make_questions(3);
        questions[1].statement = "A very long statement that keeps going. ".repeat(400);
        let variant = VariantMap {
            ordered_question_ids: questions.iter().map(|q| q.id.clone()).collect(),
            option_order_by_question: questions.iter().map(|q| (q.id.clone(), vec![0, 1, 2, 3, 4])).collect(),
        };
        let layout = plan_exam(&meta(), "F", &questions, &variant, &RenderOptions::default()).unwrap();
        let holder = layout
            .pages
            .iter()
            .find(|p| p.questions.iter().any(|q| q.layout.number == 2))
            .unwrap();
        assert_eq!(holder.questions.len(), 1);
        assert!(layout.warnings.iter().any(|w| w.contains("question 2")));
        let placed = &holder.questions[0];
        assert!(placed.top_y - placed.layout.height < layout.geometry.content_bottom());
    }

    #[test]
    fn test_overflowing_instructions_push_questions_to_page_two() {
        let questions = make_questions(3);
        let variant = generate_variant(&questions);
        let mut m = meta();
        m.instructions = Some("Answer carefully and read each option in full. ".repeat(600));
        let layout = plan_exam(&m, "F", &questions, &variant, &RenderOptions::default()).unwrap();
        assert!(layout.pages[0].questions.is_empty());
        assert_eq!(layout.pages[1].questions.len(), 3);
    }

    #[test]
    fn test_coordinates_are_deterministic() {
        let questions = make_questions(12);
        let variant = generate_variant(&questions);
        let a = plan_exam(&meta(), "F", &questions, &variant, &RenderOptions::default()).unwrap();
        let b = plan_exam(&meta(), "F", &questions, &variant, &RenderOptions::default()).unwrap();
        assert_eq!(a.coordinate_map(), b.coordinate_map());
    }

    #[test]
    fn test_plan_rejects_question_without_single_correct_choice() {
        let mut questions = make_questions(2);
        questions[0].choices[3].is_correct = true;
        let variant = generate_variant(&questions);
        let err = plan_exam(&meta(), "F", &questions, &variant, &RenderOptions::default()).unwrap_err();
        assert!(matches!(err, ExamError::InvalidQuestion { ref id, .. } if id == "q0"));
    }

    #[test]
    fn test_plan_rejects_short_choice_list() {
        let mut questions = make_questions(2);
        questions[1].choices.truncate(3);
        let variant = generate_variant(&questions);
        let err = plan_exam(&meta(), "F", &questions, &variant, &RenderOptions::default()).unwrap_err();
        assert!(matches!(err, ExamError::InvalidQuestion { ref id, .. } if id == "q1"));
    }

    #[test]
    fn test_variant_must_cover_all_questions() {
        let questions = make_questions(3);
        let mut variant = generate_variant(&questions);
        variant.ordered_question_ids.pop();
        let err = plan_exam(&meta(), "F", &questions, &variant, &RenderOptions::default()).unwrap_err();
        assert!(matches!(err, ExamError::InvalidVariant(_)));
    }
}
