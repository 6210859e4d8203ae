use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::ExamError;

/// Number of answer choices every question carries in this template.
pub const CHOICES_PER_QUESTION: usize = 5;

/// A single answer choice as stored in the question bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// A question handed in by the question-bank collaborator.
///
/// `statement` may embed inline `` `code` `` spans and fenced ```` ``` ```` blocks.
/// `image` holds encoded image bytes (PNG/JPEG); JSON carries it as base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub statement: String,
    #[serde(default, with = "super::base64_bytes", skip_serializing_if = "Option::is_none")]
    pub image: Option<Vec<u8>>,
    pub choices: Vec<Choice>,
}

impl Question {
    /// Checks the question-bank invariants: five choices, exactly one correct.
    pub fn validate(&self) -> Result<(), ExamError> {
        if self.choices.len() != CHOICES_PER_QUESTION {
            return Err(ExamError::InvalidQuestion {
                id: self.id.clone(),
                reason: format!(
                    "expected {CHOICES_PER_QUESTION} choices, found {}",
                    self.choices.len()
                ),
            });
        }
        let correct = self.choices.iter().filter(|c| c.is_correct).count();
        if correct != 1 {
            return Err(ExamError::InvalidQuestion {
                id: self.id.clone(),
                reason: format!("expected exactly one correct choice, found {correct}"),
            });
        }
        Ok(())
    }

    /// Index of the correct choice in the original (unshuffled) choice list.
    pub fn correct_index(&self) -> Option<usize> {
        self.choices.iter().position(|c| c.is_correct)
    }
}

/// Title block and page-1 content for one exam.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExamMeta {
    pub institution: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default, with = "super::base64_bytes", skip_serializing_if = "Option::is_none")]
    pub left_logo: Option<Vec<u8>>,
    #[serde(default, with = "super::base64_bytes", skip_serializing_if = "Option::is_none")]
    pub right_logo: Option<Vec<u8>>,
}
