//! Configuration management for Crosspost
//!
//! Configuration is loaded once from a TOML file and passed around as an
//! immutable value. Credentials themselves live in separate files referenced
//! from here and are only read when platform clients are built.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub bluesky: Option<BlueskyConfig>,
    pub mastodon: Option<MastodonConfig>,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub handle: String,
    /// File holding the app password
    pub password_file: String,
    #[serde(default = "default_bluesky_service")]
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastodonConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub instance: String,
    pub token_file: String,
    /// Overrides the limit reported by the instance
    pub character_limit: Option<usize>,
    #[serde(default = "default_mastodon_image_bytes")]
    pub max_image_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub platforms: Vec<String>,
}

/// Tuning for the content-adaptation pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Grapheme clusters set aside for the `(i/total) ` page marker
    pub page_reserve: usize,
    pub initial_quality: u8,
    pub quality_step: u8,
    pub min_quality: u8,
    /// Byte ceiling for a single Bluesky image
    pub max_image_bytes: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            page_reserve: 10,
            initial_quality: 85,
            quality_step: 5,
            min_quality: 10,
            max_image_bytes: 1_000_000,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_bluesky_service() -> String {
    "https://bsky.social".to_string()
}

fn default_mastodon_image_bytes() -> u64 {
    8 * 1024 * 1024
}

impl BlueskyConfig {
    pub fn expand_password_file_path(&self) -> Result<PathBuf> {
        expand_path(&self.password_file)
    }
}

impl MastodonConfig {
    pub fn expand_token_file_path(&self) -> Result<PathBuf> {
        expand_path(&self.token_file)
    }

    /// Instance URL with an `https://` scheme added when none was given
    pub fn instance_url(&self) -> String {
        if self.instance.starts_with("http://") || self.instance.starts_with("https://") {
            self.instance.clone()
        } else {
            format!("https://{}", self.instance)
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }
}

/// Resolve the configuration file path
///
/// `CROSSPOST_CONFIG` wins; otherwise the platform config directory is used.
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosspost").join("config.toml"))
}

fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .map_err(|e| ConfigError::MissingField(format!("cannot expand path '{}': {}", path, e)))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
