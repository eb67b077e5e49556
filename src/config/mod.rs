use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub writer: WriterConfig,
}

/// Upstream ads-platform client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token. Required by `run`, never logged.
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per request, first try included.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(default = "default_insights_page_size")]
    pub insights_page_size: u32,

    #[serde(default = "default_entity_page_size")]
    pub entity_page_size: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,

    #[serde(default = "default_dead_letter_dir")]
    pub dead_letter_dir: PathBuf,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_pace_min_ms")]
    pub pace_min_ms: u64,

    #[serde(default = "default_pace_max_ms")]
    pub pace_max_ms: u64,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    #[serde(default = "default_accounts_path")]
    pub accounts_path: PathBuf,

    #[serde(default)]
    pub enrich_creatives: bool,
}

/// Upsert writer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WriterConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub moderation: ModerationPolicy,
}

/// What re-ingestion does to moderation columns of an existing row.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModerationPolicy {
    /// Defaults on first insert only; `flagged`, `flagged_reason`, `ai_summary` survive.
    #[default]
    Preserve,
    /// Reset moderation columns to defaults on every upsert.
    Reset,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://graph.facebook.com/v22.0".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_backoff_secs() -> u64 {
    120
}
fn default_jitter_ms() -> u64 {
    1000
}
fn default_max_pages() -> usize {
    200
}
fn default_insights_page_size() -> u32 {
    50
}
fn default_entity_page_size() -> u32 {
    100
}
fn default_user_agent() -> String {
    "ads-ingest/0.1 (daily ads performance ingestion)".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/ads.duckdb")
}
fn default_dead_letter_dir() -> PathBuf {
    PathBuf::from("data/dead_letter")
}
fn default_true() -> bool {
    true
}
fn default_concurrency() -> usize {
    4
}
fn default_pace_min_ms() -> u64 {
    1500
}
fn default_pace_max_ms() -> u64 {
    3000
}
fn default_lookback_days() -> u32 {
    30
}
fn default_accounts_path() -> PathBuf {
    PathBuf::from("config/ad_accounts_by_team.json")
}
fn default_batch_size() -> usize {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            jitter_ms: default_jitter_ms(),
            max_pages: default_max_pages(),
            insights_page_size: default_insights_page_size(),
            entity_page_size: default_entity_page_size(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
            dead_letter_dir: default_dead_letter_dir(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            pace_min_ms: default_pace_min_ms(),
            pace_max_ms: default_pace_max_ms(),
            lookback_days: default_lookback_days(),
            accounts_path: default_accounts_path(),
            enrich_creatives: false,
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            moderation: ModerationPolicy::Preserve,
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("ADS").separator("__"))
            .build()
            .context("Failed to read configuration sources")?;

        let app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Malformed configuration")?;
        app_cfg.validate()?;
        Ok(app_cfg)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.api.max_retries >= 1, "api.max_retries must be at least 1");
        anyhow::ensure!(self.api.max_pages >= 1, "api.max_pages must be at least 1");
        anyhow::ensure!(self.pipeline.concurrency >= 1, "pipeline.concurrency must be at least 1");
        anyhow::ensure!(
            self.pipeline.pace_min_ms <= self.pipeline.pace_max_ms,
            "pipeline.pace_min_ms must not exceed pipeline.pace_max_ms"
        );
        anyhow::ensure!(self.writer.batch_size >= 1, "writer.batch_size must be at least 1");
        Ok(())
    }

    /// Token for the upstream API; missing is a startup error for `run`.
    pub fn access_token(&self) -> Result<&str> {
        self.api
            .access_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .context("No access token configured (set ADS__API__ACCESS_TOKEN)")
    }
}
