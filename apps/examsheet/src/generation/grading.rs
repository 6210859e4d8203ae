//! Bridge from detected letters back to original choice indices.
//!
//! Always reads the persisted `VariantMap`; recomputing a variant here would grade
//! against a different permutation than the one printed.

use serde::{Deserialize, Serialize};

use crate::models::{PageCoordinates, Question, RecoveryResult, VariantMap};

/// 'A' → 0 … 'E' → 4. Lowercase letters are accepted.
pub fn letter_position(letter: char) -> Option<usize> {
    let upper = letter.to_ascii_uppercase();
    if ('A'..='E').contains(&upper) {
        Some(upper as usize - 'A' as usize)
    } else {
        None
    }
}

/// `originalIndex = optionOrder[positionOfLetter]`.
pub fn original_choice_index(variant: &VariantMap, question_id: &str, letter: char) -> Option<usize> {
    let order = variant.option_order(question_id)?;
    order.get(letter_position(letter)?).copied()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedAnswer {
    pub question_number: u32,
    pub question_id: String,
    pub opinion: Option<char>,
    /// Index into the question's original choice list, `None` when unanswered.
    pub original_index: Option<usize>,
    pub is_correct: bool,
}

/// Translates a page's recovery result into original-choice terms.
///
/// Answers whose question number is not on `page` are skipped.
pub fn score_answers(
    questions: &[Question],
    variant: &VariantMap,
    page: &PageCoordinates,
    result: &RecoveryResult,
) -> Vec<GradedAnswer> {
    result
        .answers
        .iter()
        .filter_map(|answer| {
            let entry = page
                .questions
                .iter()
                .find(|q| q.number == answer.question_number)?;
            let original_index = answer
                .opinion
                .and_then(|letter| original_choice_index(variant, &entry.question_id, letter));
            let is_correct = match (original_index, questions.iter().find(|q| q.id == entry.question_id)) {
                (Some(idx), Some(question)) => question.correct_index() == Some(idx),
                _ => false,
            };
            Some(GradedAnswer {
                question_number: answer.question_number,
                question_id: entry.question_id.clone(),
                opinion: answer.opinion,
                original_index,
                is_correct,
            })
        })
        .collect()
}
