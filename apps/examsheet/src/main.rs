use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use examsheet::generation::score_answers;
use examsheet::recovery::decode_base64_image;
use examsheet::{Config, CoordinateMap, ExamError, ExamRequest, ExamService, VariantMap};

#[derive(Debug, Parser)]
#[command(name = "examsheet", version, about = "Printable exam sheets and scan recovery")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render an exam request into a PDF, its coordinate map, variant and page list.
    Generate {
        /// Exam request JSON (meta, questions, optional folio/variant).
        request: PathBuf,
        /// Directory receiving exam.pdf, coordinate_map.json, variant.json, pages.json.
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long)]
        folio: Option<String>,
        #[arg(long)]
        min_pages: Option<u32>,
        #[arg(long)]
        margin_mm: Option<f32>,
    },
    /// Detect the marked answers on one scanned page.
    Recover {
        /// Scanned image, or a text file holding base64 / a data URL.
        image: PathBuf,
        /// coordinate_map.json written by `generate`.
        #[arg(long)]
        map: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        max_width: Option<u32>,
        #[arg(long)]
        margin_mm: Option<f32>,
        /// Grade against this exam request's questions (needs --variant).
        #[arg(long, requires = "variant")]
        questions: Option<PathBuf>,
        #[arg(long)]
        variant: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting examsheet v{}", env!("CARGO_PKG_VERSION"));

    match run(cli.command, config).await {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<ExamError>() {
            Some(exam_err) => {
                eprintln!("{}", exam_err.to_json());
                std::process::exit(if exam_err.is_input_error() { 2 } else { 1 });
            }
            None => Err(err),
        },
    }
}

async fn run(command: Command, mut config: Config) -> Result<()> {
    match command {
        Command::Generate {
            request,
            out_dir,
            folio,
            min_pages,
            margin_mm,
        } => {
            if let Some(m) = margin_mm {
                config.margin_mm = m;
            }
            let mut req: ExamRequest = read_json(&request)?;
            if folio.is_some() {
                req.folio = folio;
            }
            if min_pages.is_some() {
                req.min_pages = min_pages;
            }
            let summary = generate(ExamService::new(config), req, &out_dir).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Recover {
            image,
            map,
            page,
            max_width,
            margin_mm,
            questions,
            variant,
        } => {
            if let Some(w) = max_width {
                config.max_scan_width = w;
            }
            if let Some(m) = margin_mm {
                config.margin_mm = m;
            }
            let service = ExamService::new(config);
            let bytes = read_scan(&image)?;
            let map: CoordinateMap = read_json(&map)?;
            let page_map = map.page(page)?.clone();
            let result = service.recover(bytes, map, page).await?;

            let output = match (questions, variant) {
                (Some(q), Some(v)) => {
                    let req: ExamRequest = read_json(&q)?;
                    let variant: VariantMap = read_json(&v)?;
                    let graded = score_answers(&req.questions, &variant, &page_map, &result);
                    json!({ "result": result, "graded": graded })
                }
                _ => serde_json::to_value(&result)?,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

async fn generate(service: ExamService, request: ExamRequest, out_dir: &Path) -> Result<serde_json::Value> {
    let exam = service.generate(request).await?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;
    write_file(&out_dir.join("exam.pdf"), &exam.rendered.document)?;
    write_file(
        &out_dir.join("coordinate_map.json"),
        &serde_json::to_vec_pretty(&exam.rendered.coordinate_map)?,
    )?;
    write_file(&out_dir.join("variant.json"), &serde_json::to_vec_pretty(&exam.variant)?)?;
    write_file(&out_dir.join("pages.json"), &serde_json::to_vec_pretty(&exam.rendered.pages)?)?;

    info!(folio = %exam.folio, dir = %out_dir.display(), "Exam written");
    Ok(serde_json::to_value(exam.summary())?)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

/// Raw image bytes, or base64 text when the file is not a recognizable image.
fn read_scan(path: &Path) -> Result<Vec<u8>> {
    let raw = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if image::guess_format(&raw).is_ok() {
        return Ok(raw);
    }
    let text = String::from_utf8(raw)
        .map_err(|_| ExamError::ImageDecode(format!("{} is neither an image nor base64", path.display())))?;
    Ok(decode_base64_image(&text)?)
}
