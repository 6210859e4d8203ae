//! Exam-sheet generation and optical mark recovery.
//!
//! `generation` shuffles questions and choices into a variant and grades against it,
//! `layout` turns a variant into a printable PDF plus its coordinate map, and
//! `recovery` reads a scanned page back through that map.

pub mod config;
pub mod errors;
pub mod generation;
pub mod layout;
pub mod models;
pub mod recovery;
pub mod service;

pub use config::Config;
pub use errors::ExamError;
pub use generation::{generate_variant, score_answers};
pub use layout::{plan_exam, render_exam, RenderOptions, RenderedExam};
pub use models::{CoordinateMap, ExamMeta, Question, RecoveryResult, VariantMap};
pub use recovery::{recover_answers, recover_page, RecoveryOptions};
pub use service::{ExamRequest, ExamService, GeneratedExam};
