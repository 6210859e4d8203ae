use serde::{Deserialize, Serialize};

/// Detected mark for one question on a scanned page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedAnswer {
    pub question_number: u32,
    /// Detected letter, or `None` when no bubble reached the acceptance threshold.
    pub opinion: Option<char>,
    /// In 0.0..=1.0.
    pub confidence: f32,
}

/// Outcome of one recovery request. Computed per scan, never persisted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub answers: Vec<DetectedAnswer>,
    pub warnings: Vec<String>,
    pub qr_text: Option<String>,
}
