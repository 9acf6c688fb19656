use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::Parser;

use crate::error::ExportError;

/// Cutoff applied to past events when `LUMA_PAST_CUTOFF` is unset. Events
/// starting on or before this UTC date are dropped from the export.
pub const DEFAULT_PAST_CUTOFF: &str = "2024-04-20";

const DEFAULT_BASE_URL: &str = "https://api.lu.ma";
const DEFAULT_OUT_DIR: &str = "exported";

/// CLI surface for the exporter.
#[derive(Debug, Parser, Clone)]
#[command(
    author,
    version,
    about = "Export Luma events and their registrants to CSV reports"
)]
pub struct CliArgs {
    /// Directory the CSV reports are written into (created if absent).
    #[arg(long = "out", value_name = "DIR", default_value = DEFAULT_OUT_DIR)]
    pub out: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Tunables {
    pub base_url: String,
    pub auth_key: String,
    pub past_cutoff: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Paths {
    pub out_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paths: Paths,
    pub tunables: Tunables,
}

impl CliArgs {
    pub fn resolve(self) -> Result<AppConfig, ExportError> {
        ensure_directory(&self.out)?;
        let tunables = Tunables::from_env()?;

        Ok(AppConfig {
            paths: Paths { out_dir: self.out },
            tunables,
        })
    }
}

impl Tunables {
    pub fn from_env() -> Result<Self, ExportError> {
        let base_url = env::var("LUMA_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let auth_key = env::var("LUMA_AUTH_KEY").map_err(|_| {
            ExportError::Config(
                "LUMA_AUTH_KEY is not set; it must hold the value of the \
                 luma.auth-session-key session cookie"
                    .to_string(),
            )
        })?;

        let cutoff_raw =
            env::var("LUMA_PAST_CUTOFF").unwrap_or_else(|_| DEFAULT_PAST_CUTOFF.to_string());
        let past_cutoff = parse_cutoff(&cutoff_raw)?;

        Ok(Self {
            base_url,
            auth_key,
            past_cutoff,
        })
    }
}

/// Parses a `YYYY-MM-DD` cutoff into UTC midnight of that day.
pub fn parse_cutoff(raw: &str) -> Result<DateTime<Utc>, ExportError> {
    let date = raw.trim().parse::<NaiveDate>().map_err(|err| {
        ExportError::Config(format!("invalid value for LUMA_PAST_CUTOFF: {err}"))
    })?;
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

/// Directory used for persistent logs.
pub fn data_directory() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("luma-export")
}

fn ensure_directory(path: &Path) -> Result<(), ExportError> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}
