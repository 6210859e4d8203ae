use std::time::Duration;

use anyhow::{Context, Result};

/// Process configuration loaded from environment variables.
/// Every key has a default; a key that is set but unparsable is an error.
#[derive(Debug, Clone)]
pub struct Config {
    pub margin_mm: f32,
    pub min_pages: u32,
    pub max_scan_width: u32,
    pub request_timeout: Duration,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            margin_mm: 12.0,
            min_pages: 1,
            max_scan_width: 1600,
            request_timeout: Duration::from_secs(30),
            rust_log: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let default = Self::default();
        Ok(Config {
            margin_mm: parse_env("EXAM_MARGIN_MM", default.margin_mm)?,
            min_pages: parse_env("EXAM_MIN_PAGES", default.min_pages)?,
            max_scan_width: parse_env("OMR_MAX_SCAN_WIDTH", default.max_scan_width)?,
            request_timeout: Duration::from_secs(parse_env(
                "REQUEST_TIMEOUT_SECS",
                default.request_timeout.as_secs(),
            )?),
            rust_log: std::env::var("RUST_LOG").unwrap_or(default.rust_log),
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
