//! Async facade over the two engines.
//!
//! # spawn_blocking pattern
//! Rendering and scan analysis are CPU-bound. Each call moves its owned inputs into
//! `tokio::task::spawn_blocking` so the async executor is never blocked, and the
//! whole call is bounded by the configured request timeout.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::ExamError;
use crate::generation::generate_variant;
use crate::layout::{render_exam, RenderOptions, RenderedExam};
use crate::models::{CoordinateMap, ExamMeta, Question, RecoveryResult, VariantMap};
use crate::recovery::{recover_page, RecoveryOptions};

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ExamRequest {
    pub meta: ExamMeta,
    /// Generated when absent.
    #[serde(default)]
    pub folio: Option<String>,
    pub questions: Vec<Question>,
    /// Reuse a stored variant instead of drawing a new one (reprints).
    #[serde(default)]
    pub variant: Option<VariantMap>,
    #[serde(default)]
    pub min_pages: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct GeneratedExam {
    pub folio: String,
    pub variant: VariantMap,
    pub rendered: RenderedExam,
}

#[derive(Debug, Serialize)]
pub struct GenerationSummary<'a> {
    pub folio: &'a str,
    pub page_count: usize,
    pub question_count: usize,
    pub warnings: &'a [String],
}

impl GeneratedExam {
    pub fn summary(&self) -> GenerationSummary<'_> {
        GenerationSummary {
            folio: &self.folio,
            page_count: self.rendered.pages.len(),
            question_count: self.variant.ordered_question_ids.len(),
            warnings: &self.rendered.warnings,
        }
    }
}

/// Short uppercase folio such as `3F9A1C07`.
pub fn new_folio() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

// ────────────────────────────────────────────────────────────────────────────
// Service
// ────────────────────────────────────────────────────────────────────────────

/// Shared handle; cheap to clone.
#[derive(Debug, Clone)]
pub struct ExamService {
    config: Arc<Config>,
}

impl ExamService {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn render_options(&self, min_pages: Option<u32>) -> RenderOptions {
        RenderOptions {
            min_pages: min_pages.unwrap_or(self.config.min_pages),
            margin_mm: self.config.margin_mm,
        }
    }

    pub fn recovery_options(&self) -> RecoveryOptions {
        RecoveryOptions {
            margin_mm: self.config.margin_mm,
            max_width: self.config.max_scan_width,
        }
    }

    /// Validates the question set, draws (or reuses) a variant and renders the exam.
    pub async fn generate(&self, request: ExamRequest) -> Result<GeneratedExam, ExamError> {
        if request.questions.is_empty() {
            warn!("Generating an exam with no questions");
        }
        for q in &request.questions {
            q.validate()?;
        }

        let folio = request
            .folio
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(new_folio);
        let variant = match request.variant {
            Some(v) => {
                v.validate_against(&request.questions)?;
                v
            }
            None => generate_variant(&request.questions),
        };
        let options = self.render_options(request.min_pages);

        let meta = request.meta;
        let questions = request.questions;
        let job_folio = folio.clone();
        let job_variant = variant.clone();
        let rendered = self
            .run_blocking("render", move || {
                render_exam(&meta, &job_folio, &questions, &job_variant, &options)
            })
            .await?;

        info!(folio = %folio, pages = rendered.pages.len(), "Exam generated");
        Ok(GeneratedExam {
            folio,
            variant,
            rendered,
        })
    }

    /// Recovers one scanned page against its stored coordinate map.
    pub async fn recover(
        &self,
        image: Vec<u8>,
        map: CoordinateMap,
        page_number: u32,
    ) -> Result<RecoveryResult, ExamError> {
        let options = self.recovery_options();
        self.run_blocking("recover", move || {
            recover_page(&image, &map, page_number, &options)
        })
        .await
    }

    async fn run_blocking<T, F>(&self, label: &'static str, job: F) -> Result<T, ExamError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ExamError> + Send + 'static,
    {
        let limit = self.config.request_timeout;
        match tokio::time::timeout(limit, tokio::task::spawn_blocking(job)).await {
            Ok(joined) => joined.map_err(|e| {
                ExamError::Internal(anyhow::anyhow!("spawn_blocking failed in {label}: {e}"))
            })?,
            Err(_) => {
                warn!(label, timeout_secs = limit.as_secs(), "Blocking job timed out");
                Err(ExamError::Timeout(limit.as_secs()))
            }
        }
    }
}
