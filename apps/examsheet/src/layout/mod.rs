// Layout Engine: mixed-text measurement, question blocks, pagination and PDF drawing.
// Planning is pure geometry; only `render` touches printpdf.
// CPU-bound rendering must run inside tokio::task::spawn_blocking (see `service`).

pub mod assets;
pub mod font_metrics;
pub mod geometry;
pub mod header;
pub mod markup;
pub mod paginator;
pub mod question_block;
pub mod render;
pub mod wrap;

// Re-export the public API consumed by the service and the binary.
pub use geometry::PageGeometry;
pub use paginator::{plan_exam, ExamLayout, RenderOptions};
pub use render::{render_exam, RenderedExam};
