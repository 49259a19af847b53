use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub notifier: Option<NotifierConfig>,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl FeedConfig {
    /// Label used in logs: the configured name, or the URL.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibraryConfig {
    #[serde(default = "default_library_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            base_url: default_library_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            concurrency: default_concurrency(),
            page_size: default_page_size(),
        }
    }
}

impl LibraryConfig {
    /// Token from config, else the `PLEX_TOKEN` environment variable.
    pub fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("PLEX_TOKEN").ok().filter(|t| !t.is_empty()))
    }
}

fn default_library_url() -> String {
    "http://localhost:32400".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    2
}
fn default_concurrency() -> usize {
    4
}
fn default_page_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReconcileConfig {
    /// Move `added` entries back to `pending` when the library no longer has them.
    #[serde(default)]
    pub demote_missing: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    pub channel_id: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_flood_threshold")]
    pub added_flood_threshold: usize,
}

impl NotifierConfig {
    /// Token from config, else the `DISCORD_BOT_TOKEN` environment variable.
    pub fn resolved_token(&self) -> Option<String> {
        self.bot_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("DISCORD_BOT_TOKEN").ok().filter(|t| !t.is_empty()))
    }
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}
/// Added announcements with this many entries or more are not sent.
pub const DEFAULT_ADDED_FLOOD_THRESHOLD: usize = 50;

fn default_flood_threshold() -> usize {
    DEFAULT_ADDED_FLOOD_THRESHOLD
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            run_on_start: default_run_on_start(),
        }
    }
}

fn default_interval_minutes() -> u64 {
    1440
}
fn default_run_on_start() -> bool {
    true
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.store.path.as_os_str().is_empty() {
        anyhow::bail!("store.path must not be empty");
    }

    for feed in &config.feeds {
        let url = feed.url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://") || url.starts_with("file://"))
        {
            anyhow::bail!(
                "Unsupported feed URL: '{}'. Must start with http://, https:// or file://",
                url
            );
        }
    }

    // Validate library
    if config.library.concurrency < 1 {
        anyhow::bail!("library.concurrency must be >= 1");
    }
    if config.library.page_size < 1 {
        anyhow::bail!("library.page_size must be >= 1");
    }
    if config.library.timeout_secs < 1 {
        anyhow::bail!("library.timeout_secs must be >= 1");
    }

    if let Some(notifier) = &config.notifier {
        if notifier.channel_id.trim().is_empty() {
            anyhow::bail!("notifier.channel_id must not be empty");
        }
    }

    if config.schedule.interval_minutes < 1 {
        anyhow::bail!("schedule.interval_minutes must be >= 1");
    }

    Ok(())
}
