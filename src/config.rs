use crate::batch::BatchOptions;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub language_model: LanguageModelConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Remote collection that insert/patch/delete runs target by default.
    pub default_calendar_id: String,
    /// Used when deriving an end time from a start time.
    pub default_duration_minutes: i64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self { default_calendar_id: "primary".to_string(), default_duration_minutes: 60 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum in-flight remote operations per batch wave.
    pub batch_size: usize,
    /// Pause between waves, to stay under the store's rate limits.
    pub inter_batch_delay_ms: u64,
    /// Override for the calendar API base url (testing, self-hosted proxies).
    pub api_base: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { batch_size: 10, inter_batch_delay_ms: 500, api_base: None }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguageModelConfig {
    pub model: String,
    /// Bounded automatic retries when the model reports temporary overload.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for LanguageModelConfig {
    fn default() -> Self {
        Self { model: "gemini-2.0-flash".to_string(), max_retries: 3, retry_delay_ms: 2000 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            calendar: CalendarConfig::default(),
            sync: SyncConfig::default(),
            language_model: LanguageModelConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;

        // If config doesn't exist, create default
        if !config_path.exists() {
            let config = Config::default();
            config.save()?;
            return Ok(config);
        }

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {:?}", config_path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", config_path))
    }

    pub fn save(&self) -> Result<()> {
        let config_path = get_config_path()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file {:?}", config_path))
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            batch_size: self.sync.batch_size,
            inter_batch_delay: Duration::from_millis(self.sync.inter_batch_delay_ms),
        }
    }
}

fn get_config_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "calsnap", "calsnap")
        .context("Failed to determine project directories")?;
    Ok(proj_dirs.config_dir().join("config.toml"))
}
