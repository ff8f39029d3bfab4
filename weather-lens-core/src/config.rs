use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::search::DEFAULT_TOLERANCE_SECS;

/// Where photos are read from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImagesConfig {
    pub dir: PathBuf,
    /// Matched case-insensitively, without the leading dot.
    pub extensions: Vec<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("resources/images"), extensions: vec!["jpg".to_string()] }
    }
}

/// Layout of the weather observation exports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservationsConfig {
    pub dir: PathBuf,
    pub delimiter: char,
    /// Lines before the header row.
    pub header_skip: usize,
    pub time_column: String,
    /// `chrono` format string for `time_column`.
    pub time_format: String,
}

impl Default for ObservationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("resources/observations"),
            delimiter: ';',
            header_skip: 6,
            time_column: "Local time in Moscow".to_string(),
            time_format: "%d.%m.%Y %H:%M".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchingConfig {
    pub tolerance_secs: i64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { tolerance_secs: DEFAULT_TOLERANCE_SECS }
    }
}

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedderConfig {
    /// Base URL of the CLIP server, e.g. "http://localhost:51000".
    pub endpoint: Option<String>,
    pub model: String,
    /// Multiplier applied to cosine similarities before the softmax.
    pub logit_scale: f32,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self { endpoint: None, model: "ViT-B/32".to_string(), logit_scale: 100.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescribedColumn {
    pub column: String,
    pub label: String,
    #[serde(default)]
    pub suffix: String,
}

impl DescribedColumn {
    fn new(column: &str, label: &str, suffix: &str) -> Self {
        Self { column: column.to_string(), label: label.to_string(), suffix: suffix.to_string() }
    }
}

/// How weather records are turned into text prompts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DescriptionConfig {
    pub prefix: String,
    pub columns: Vec<DescribedColumn>,
}

impl Default for DescriptionConfig {
    fn default() -> Self {
        Self {
            prefix: "A photo of the sky".to_string(),
            columns: vec![
                DescribedColumn::new("WW", "Weather", ""),
                DescribedColumn::new("N", "Cloud cover", ""),
                DescribedColumn::new("T", "Temperature", " °C"),
                DescribedColumn::new("VV", "Visibility", " km"),
            ],
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [observations]
/// time_column = "Local time in Moscow"
///
/// [embedder]
/// endpoint = "http://localhost:51000"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub images: ImagesConfig,
    pub observations: ObservationsConfig,
    pub matching: MatchingConfig,
    pub embedder: EmbedderConfig,
    pub description: DescriptionConfig,
}

impl Config {
    /// Load config from the platform location, or defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, use defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-lens", "weather-lens")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.matching.tolerance_secs < 0 {
            return Err(anyhow!(
                "matching.tolerance_secs must not be negative (got {})",
                self.matching.tolerance_secs
            ));
        }

        if !self.observations.delimiter.is_ascii() {
            return Err(anyhow!(
                "observations.delimiter must be a single ASCII character (got {:?})",
                self.observations.delimiter
            ));
        }

        if self.images.extensions.is_empty() {
            return Err(anyhow!("images.extensions must list at least one extension"));
        }

        Ok(())
    }

    /// Set or replace the embedding endpoint, keeping the model unless a new one is given.
    pub fn set_embedder(&mut self, endpoint: String, model: Option<String>) {
        self.embedder.endpoint = Some(endpoint);

        if let Some(model) = model {
            self.embedder.model = model;
        }
    }

    pub fn embedder_endpoint(&self) -> Option<&str> {
        self.embedder.endpoint.as_deref().filter(|e| !e.trim().is_empty())
    }
}
