use serde_json::{json, Value};
use thiserror::Error;

/// Crate-level error type.
///
/// Only malformed input is a hard failure. Degraded scans (missing QR, missing marks,
/// faint bubbles) are reported through warnings on a successful result instead.
#[derive(Debug, Error)]
pub enum ExamError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Coordinate map has no page {0}")]
    MissingPage(u32),

    #[error("Invalid coordinate map: {0}")]
    InvalidCoordinateMap(String),

    #[error("Invalid variant map: {0}")]
    InvalidVariant(String),

    #[error("Invalid question {id}: {reason}")]
    InvalidQuestion { id: String, reason: String },

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("QR encode error: {0}")]
    QrEncode(String),

    #[error("Operation timed out after {0}s")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ExamError {
    /// Stable machine-readable code for callers that surface errors over a wire.
    pub fn code(&self) -> &'static str {
        match self {
            ExamError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            ExamError::MissingPage(_) => "MISSING_PAGE",
            ExamError::InvalidCoordinateMap(_) => "INVALID_COORDINATE_MAP",
            ExamError::InvalidVariant(_) => "INVALID_VARIANT",
            ExamError::InvalidQuestion { .. } => "INVALID_QUESTION",
            ExamError::Pdf(_) => "PDF_ERROR",
            ExamError::QrEncode(_) => "QR_ENCODE_ERROR",
            ExamError::Timeout(_) => "TIMEOUT",
            ExamError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors caused by the caller's input rather than by this process.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ExamError::ImageDecode(_)
                | ExamError::MissingPage(_)
                | ExamError::InvalidCoordinateMap(_)
                | ExamError::InvalidVariant(_)
                | ExamError::InvalidQuestion { .. }
        )
    }

    /// JSON error body, same shape for every variant.
    pub fn to_json(&self) -> Value {
        if let ExamError::Internal(e) = self {
            tracing::error!("Internal error: {e:?}");
        }
        json!({
            "error": {
                "code": self.code(),
                "message": self.to_string()
            }
        })
    }
}
