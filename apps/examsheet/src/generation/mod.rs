// Variant generation and the grading bridge that inverts it.
// Both read and write only the in-memory VariantMap; persisting it is the caller's job.

pub mod grading;
pub mod variant;

pub use grading::{letter_position, original_choice_index, score_answers, GradedAnswer};
pub use variant::{generate_variant, generate_variant_with};
