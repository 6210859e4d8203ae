use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::ExamError;
use crate::models::question::Question;

/// The randomized ordering assigned to one generated exam.
///
/// Persisted verbatim next to the rendered document. Grading inverts exactly this
/// permutation, so it is never regenerated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantMap {
    pub ordered_question_ids: Vec<String>,
    /// question id → permutation of indices into that question's original choices.
    /// Position `i` of the permutation is printed with letter `'A' + i`.
    pub option_order_by_question: BTreeMap<String, Vec<usize>>,
}

impl VariantMap {
    pub fn option_order(&self, question_id: &str) -> Option<&[usize]> {
        self.option_order_by_question
            .get(question_id)
            .map(Vec::as_slice)
    }

    /// Verifies that this map is a pair of bijections over `questions`.
    pub fn validate_against(&self, questions: &[Question]) -> Result<(), ExamError> {
        let mut seen = HashSet::new();
        for id in &self.ordered_question_ids {
            if !seen.insert(id.as_str()) {
                return Err(ExamError::InvalidVariant(format!(
                    "question {id} appears more than once"
                )));
            }
            let question = questions.iter().find(|q| &q.id == id).ok_or_else(|| {
                ExamError::InvalidVariant(format!("question {id} is not in the question set"))
            })?;
            let order = self.option_order(id).ok_or_else(|| {
                ExamError::InvalidVariant(format!("question {id} has no option order"))
            })?;
            if !is_permutation(order, question.choices.len()) {
                return Err(ExamError::InvalidVariant(format!(
                    "option order for {id} is not a permutation of 0..{}",
                    question.choices.len()
                )));
            }
        }
        Ok(())
    }
}

/// True when `order` contains every index in `0..len` exactly once.
pub fn is_permutation(order: &[usize], len: usize) -> bool {
    if order.len() != len {
        return false;
    }
    let mut hit = vec![false; len];
    for &i in order {
        if i >= len || hit[i] {
            return false;
        }
        hit[i] = true;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::Choice;

    fn question(id: &str) -> Question {
        Question {
            id: id.into(),
            statement: "s".into(),
            image: None,
            choices: (0..5)
                .map(|i| Choice {
                    text: i.to_string(),
                    is_correct: i == 0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_is_permutation() {
        assert!(is_permutation(&[2, 0, 1], 3));
        assert!(!is_permutation(&[0, 0, 1], 3));
        assert!(!is_permutation(&[0, 1, 3], 3));
        assert!(!is_permutation(&[0, 1], 3));
        assert!(is_permutation(&[], 0));
    }

    #[test]
    fn test_validate_against_rejects_duplicate_id() {
        let qs = vec![question("a")];
        let mut map = VariantMap::default();
        map.ordered_question_ids = vec!["a".into(), "a".into()];
        map.option_order_by_question.insert("a".into(), vec![0, 1, 2, 3, 4]);
        assert!(matches!(
            map.validate_against(&qs),
            Err(ExamError::InvalidVariant(_))
        ));
    }

    #[test]
    fn test_validate_against_rejects_bad_option_order() {
        let qs = vec![question("a")];
        let mut map = VariantMap::default();
        map.ordered_question_ids = vec!["a".into()];
        map.option_order_by_question.insert("a".into(), vec![0, 1, 2, 3, 3]);
        assert!(map.validate_against(&qs).is_err());
    }

    #[test]
    fn test_validate_against_accepts_subset() {
        let qs = vec![question("a"), question("b")];
        let mut map = VariantMap::default();
        map.ordered_question_ids = vec!["b".into()];
        map.option_order_by_question.insert("b".into(), vec![4, 3, 2, 1, 0]);
        assert!(map.validate_against(&qs).is_ok());
    }
}
