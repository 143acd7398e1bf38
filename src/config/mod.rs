// Configuration management module
// Handles TOML configuration for the Gemini provider and search defaults


use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_base: String,
    /// API key for the Gemini API. The `GEMINI_API_KEY` environment variable
    /// takes precedence over this value.
    pub api_key: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com".to_string(),
            api_key: String::new(),
            embedding_model: "text-embedding-004".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub default_top_k: usize,
    pub overfetch_factor: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            overfetch_factor: 2,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid API base URL: {0}")]
    InvalidApiBase(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid top_k: {0} (must be between 1 and 1000)")]
    InvalidTopK(usize),
    #[error("Invalid overfetch factor: {0} (must be between 1 and 100)")]
    InvalidOverfetchFactor(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                gemini: GeminiConfig::default(),
                search: SearchConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load from the default per-user configuration directory.
    #[inline]
    pub fn load_default() -> Result<Self> {
        Ok(Self::load(Self::config_dir()?)?)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the default per-user configuration directory
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir()
            .ok_or(ConfigError::DirectoryError)?
            .join("rag-query");
        Ok(dir)
    }

    /// Directory holding the persisted index and chunk snapshots
    #[inline]
    pub fn storage_dir(&self) -> PathBuf {
        self.base_dir.join("store")
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gemini.validate()?;
        self.search.validate()?;
        Ok(())
    }
}

impl GeminiConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.api_base).is_err() {
            return Err(ConfigError::InvalidApiBase(self.api_base.clone()));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }
        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }
        Ok(())
    }

    /// Resolve the API key, preferring the `GEMINI_API_KEY` environment
    /// variable over the configuration file.
    #[inline]
    pub fn resolve_api_key(&self) -> Option<String> {
        env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                if self.api_key.trim().is_empty() {
                    None
                } else {
                    Some(self.api_key.clone())
                }
            })
    }

    /// Build the `embedContent` endpoint URL for the configured model
    #[inline]
    pub fn embed_url(&self) -> Result<Url, ConfigError> {
        let base = Url::parse(&self.api_base)
            .map_err(|_| ConfigError::InvalidApiBase(self.api_base.clone()))?;
        base.join(&format!(
            "/v1beta/models/{}:embedContent",
            self.embedding_model
        ))
        .map_err(|_| ConfigError::InvalidModel(self.embedding_model.clone()))
    }
}

impl SearchConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.default_top_k) {
            return Err(ConfigError::InvalidTopK(self.default_top_k));
        }
        if !(1..=100).contains(&self.overfetch_factor) {
            return Err(ConfigError::InvalidOverfetchFactor(self.overfetch_factor));
        }
        Ok(())
    }
}
