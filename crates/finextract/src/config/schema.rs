use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            store: StoreConfig::default(),
            extraction: ExtractionConfig::default(),
            batch: BatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackendKind,
    /// SQLite database file. Ignored by the memory backend.
    #[serde(default)]
    pub path: Option<String>,
}

impl StoreConfig {
    pub fn sqlite_path(&self) -> PathBuf {
        self.path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path)
    }
}

/// `~/.finextract/data/finextract.db`, or relative to the working directory
/// when no home directory is known.
pub fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".finextract"))
        .unwrap_or_else(|| PathBuf::from(".finextract"))
        .join("data")
        .join("finextract.db")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Per-file budget for parse and extraction.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// PDF fragments closer than this vertically share a line.
    #[serde(default = "default_line_merge_threshold")]
    pub line_merge_threshold: f32,
    /// Horizontal gap that separates two PDF table cells.
    #[serde(default = "default_column_gap_threshold")]
    pub column_gap_threshold: f32,
    #[serde(default = "default_top_holdings")]
    pub top_holdings: usize,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_line_merge_threshold() -> f32 {
    5.0
}

fn default_column_gap_threshold() -> f32 {
    15.0
}

fn default_top_holdings() -> usize {
    crate::summary::DEFAULT_TOP_HOLDINGS
}

impl ExtractionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            line_merge_threshold: default_line_merge_threshold(),
            column_gap_threshold: default_column_gap_threshold(),
            top_holdings: default_top_holdings(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Jobs processed at the same time. Files within a job are sequential.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_progress_channel_capacity")]
    pub progress_channel_capacity: usize,
}

fn default_max_concurrent_jobs() -> usize {
    num_cpus::get()
}

fn default_progress_channel_capacity() -> usize {
    256
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            progress_channel_capacity: default_progress_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
