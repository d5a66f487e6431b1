//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for doiharvest
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub harvest: HarvestConfig,
    pub merge: MergeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub endpoint: String,
    /// Contact address for the polite-pool user agent
    #[serde(deserialize_with = "deserialize_env_var")]
    pub mailto: Option<String>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: doiharvest_datacite::config::DEFAULT_ENDPOINT.to_string(),
            mailto: std::env::var("DOIHARVEST_MAILTO").ok(),
            timeout_secs: 60,
            max_attempts: 6,
            base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub checkpoint_dir: PathBuf,
    pub shard_dir: PathBuf,
    pub flush_every: usize,
    pub page_size: u32,
    pub zstd_level: i32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("checkpoints"),
            shard_dir: PathBuf::from("batches"),
            flush_every: 10_000,
            page_size: 1000,
            zstd_level: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub output_dir: PathBuf,
    pub basename: String,
    pub zstd_level: i32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("merged"),
            basename: doiharvest_merge::DEFAULT_BASENAME.to_string(),
            zstd_level: 3,
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./doiharvest.toml (current directory)
    /// 2. ~/.config/doiharvest/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("doiharvest.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "doiharvest") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
