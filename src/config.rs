use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;

/// Configuration problems detected before any network activity.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown market area: {0}")]
    UnknownMarketArea(String),

    #[error("Invalid time zone '{zone}' for market area {area}: {reason}")]
    InvalidTimezone { area: String, zone: String, reason: String },

    #[error("Duplicate market area code: {0}")]
    DuplicateMarketArea(String),

    #[error("Start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("ENTSO-E API token is empty")]
    MissingToken,

    #[error("Invalid API setting {field}: {reason}")]
    InvalidApiSetting { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default = "default_market_areas")]
    pub market_areas: Vec<MarketAreaConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_document_type")]
    pub document_type: String,
    #[serde(default = "default_max_days")]
    pub max_days_per_request: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_skip_unsupported")]
    pub skip_unsupported_days: bool,
    #[serde(default = "default_resolutions")]
    pub supported_resolutions: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: String,
    #[serde(default)]
    pub xml: bool,
    #[serde(default = "default_true")]
    pub mtu_csv: bool,
    #[serde(default = "default_true")]
    pub hourly_csv: bool,
    #[serde(default)]
    pub daily_stats_csv: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MarketAreaConfig {
    pub code: String,
    pub eic: String,
    pub timezone: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            retry: RetryConfig::default(),
            processing: ProcessingConfig::default(),
            output: OutputConfig::default(),
            market_areas: default_market_areas(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            document_type: default_document_type(),
            max_days_per_request: default_max_days(),
            page_size: default_page_size(),
            page_delay_ms: default_page_delay_ms(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_pct: default_jitter(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            skip_unsupported_days: default_skip_unsupported(),
            supported_resolutions: default_resolutions(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            xml: false,
            mtu_csv: true,
            hourly_csv: true,
            daily_stats_csv: false,
        }
    }
}

fn default_base_url() -> String { "https://web-api.tp.entsoe.eu/api".to_string() }
fn default_document_type() -> String { "A44".to_string() }
fn default_max_days() -> u32 { 100 }
fn default_page_size() -> u32 { 100 }
fn default_page_delay_ms() -> u64 { 1000 }
fn default_connect_timeout() -> u64 { 10 }
fn default_request_timeout() -> u64 { 60 }
fn default_max_attempts() -> u32 { 5 }
fn default_base_delay_ms() -> u64 { 3000 }
fn default_max_delay_ms() -> u64 { 60_000 }
fn default_multiplier() -> f64 { 2.0 }
fn default_jitter() -> f64 { 0.1 }
fn default_skip_unsupported() -> bool { true }
fn default_resolutions() -> Vec<u32> { vec![60, 30, 15] }
fn default_output_dir() -> String { "download".to_string() }
fn default_true() -> bool { true }

fn default_market_areas() -> Vec<MarketAreaConfig> {
    // PT and GB follow the CET-based day-ahead market day, not local wall-clock time.
    [
        ("ES", "10YES-REE------0", "Europe/Madrid", "Spain"),
        ("PT", "10YPT-REN------W", "Europe/Brussels", "Portugal"),
        ("IT-North", "10Y1001A1001A73I", "Europe/Rome", "Italy (North)"),
        ("IT-South", "10Y1001A1001A788", "Europe/Rome", "Italy (South)"),
        ("NL", "10YNL----------L", "Europe/Amsterdam", "Netherlands"),
        ("FR", "10YFR-RTE------C", "Europe/Paris", "France"),
        ("BE", "10YBE----------2", "Europe/Brussels", "Belgium"),
        ("GB", "10YGB----------A", "Europe/Brussels", "Great Britain"),
        ("CZ", "10YCZ-CEPS-----N", "Europe/Prague", "Czech Republic"),
        ("CH", "10YCH-SWISSGRIDZ", "Europe/Zurich", "Switzerland"),
    ]
    .into_iter()
    .map(|(code, eic, timezone, name)| MarketAreaConfig {
        code: code.to_string(),
        eic: eic.to_string(),
        timezone: timezone.to_string(),
        name: Some(name.to_string()),
    })
    .collect()
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub entsoe_api_token: String,
    pub entsoe_api_base_url: Option<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            entsoe_api_token: std::env::var("ENTSOE_API_TOKEN")
                .context("ENTSOE_API_TOKEN not set")?,
            entsoe_api_base_url: std::env::var("ENTSOE_API_BASE_URL").ok(),
        })
    }
}
