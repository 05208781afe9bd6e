//! Configuration models for ratingscan.
//!
//! All I^R (resolvable ignorance) of a run is parameterized here and
//! loaded from a TOML file.
//! CLI flags are applied on top through [`Config::apply_overrides`].

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Top-level configuration for ratingscan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote rating service
    pub source: SourceConfig,

    /// Run parameters
    #[serde(default)]
    pub run: RunSettings,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Remote rating service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the rating API (e.g. "https://ratings.example.org/api/v1")
    pub base_url: String,

    /// Bearer token; may contain ${ENV_VAR} references
    #[serde(default)]
    pub api_token: Option<String>,

    /// Environment variable consulted when `api_token` is not set
    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Items requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_api_token_env() -> String {
    "RATINGSCAN_API_TOKEN".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_page_size() -> u32 {
    100
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token: None,
            api_token_env: default_api_token_env(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            page_size: default_page_size(),
        }
    }
}

/// Parameters that shape a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Only clubs whose id starts with this prefix are scanned
    #[serde(default)]
    pub filter_prefix: String,

    /// Number of concurrent club workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Groups smaller than this get no percentile table
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: usize,

    /// Rating-at-cutoff uses the latest rating period strictly before this date.
    /// Defaults to January 1st of the reference year.
    #[serde(default)]
    pub cutoff_date: Option<NaiveDate>,

    /// Year used to compute ages. Defaults to the current year.
    #[serde(default)]
    pub reference_year: Option<i32>,

    /// Save the checkpoint after this many completed clubs
    #[serde(default = "default_save_every")]
    pub save_every: usize,

    /// Resume from an existing checkpoint
    #[serde(default)]
    pub resume: bool,
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(16)
}

fn default_min_sample_size() -> usize {
    10
}

fn default_save_every() -> usize {
    10
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            filter_prefix: String::new(),
            concurrency: default_concurrency(),
            min_sample_size: default_min_sample_size(),
            cutoff_date: None,
            reference_year: None,
            save_every: default_save_every(),
            resume: false,
        }
    }
}

impl RunSettings {
    /// Year ages are computed against.
    pub fn reference_year(&self) -> i32 {
        self.reference_year.unwrap_or_else(|| Utc::now().year())
    }

    /// Effective cutoff date for rating-at-cutoff.
    pub fn cutoff(&self) -> NaiveDate {
        self.cutoff_date.unwrap_or_else(|| {
            NaiveDate::from_ymd_opt(self.reference_year(), 1, 1).unwrap_or(NaiveDate::MIN)
        })
    }
}

/// Report format(s) to emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
    #[default]
    Both,
}

impl OutputFormat {
    pub fn writes_json(self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }

    pub fn writes_csv(self) -> bool {
        matches!(self, Self::Csv | Self::Both)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
            Self::Both => write!(f, "both"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "both" => Ok(Self::Both),
            other => Err(ConfigError::Invalid(format!(
                "unknown output format '{other}' (expected json, csv or both)"
            ))),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving the report files
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Report format
    #[serde(default)]
    pub format: OutputFormat,

    /// Checkpoint file for resumable runs
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("ratingscan.checkpoint.json")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: OutputFormat::default(),
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

/// Command-line overrides applied on top of the file configuration.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub concurrency: Option<usize>,
    pub resume: bool,
    pub checkpoint_path: Option<PathBuf>,
    pub min_sample_size: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub filter_prefix: Option<String>,
    pub format: Option<OutputFormat>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseStr(source) => ConfigError::Parse {
                path: path.to_owned(),
                source,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::ParseStr)
    }

    /// Apply CLI overrides.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(concurrency) = overrides.concurrency {
            self.run.concurrency = concurrency;
        }
        if overrides.resume {
            self.run.resume = true;
        }
        if let Some(path) = overrides.checkpoint_path {
            self.output.checkpoint_path = path;
        }
        if let Some(min) = overrides.min_sample_size {
            self.run.min_sample_size = min;
        }
        if let Some(dir) = overrides.output_dir {
            self.output.dir = dir;
        }
        if let Some(prefix) = overrides.filter_prefix {
            self.run.filter_prefix = prefix;
        }
        if let Some(format) = overrides.format {
            self.output.format = format;
        }
    }

    /// Semantic validation beyond what deserialization checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("source.base_url is empty".to_string()));
        }
        if self.run.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "run.concurrency must be at least 1".to_string(),
            ));
        }
        if self.run.min_sample_size == 0 {
            return Err(ConfigError::Invalid(
                "run.min_sample_size must be at least 1".to_string(),
            ));
        }
        if self.run.save_every == 0 {
            return Err(ConfigError::Invalid(
                "run.save_every must be at least 1".to_string(),
            ));
        }
        if self.source.page_size == 0 {
            return Err(ConfigError::Invalid(
                "source.page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the API token from config or environment.
    ///
    /// A missing token is not an error; public rating services need none.
    pub fn resolve_api_token(&self) -> Option<String> {
        if let Some(token) = &self.source.api_token {
            return Some(expand_env_vars(token));
        }
        std::env::var(&self.source.api_token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax. Unset variables are left as-is.
pub fn expand_env_vars(s: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };

    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }
    result
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to parse config: {0}")]
    ParseStr(toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
