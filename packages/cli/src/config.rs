//! Pipeline configuration.
//!
//! Settings come from, in increasing precedence: built-in defaults, a TOML
//! file (`--config` or `TRIP_FLOWS_CONFIG`), the
//! `TRIP_FLOWS_REFERENCE_AREA` environment variable, and command-line
//! flags. The merged result is validated once before any stage runs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trip_flows_analytics::percentile::DEFAULT_QUANTILE;
use trip_flows_analytics::{DEFAULT_REFERENCE_AREA, SummaryOptions};
use trip_flows_ingest::tagger::DEFAULT_CHUNK_SIZE;
use trip_flows_spatial::DEFAULT_NAME_PROPERTY;

/// Names the configuration file when `--config` is not given.
pub const CONFIG_ENV: &str = "TRIP_FLOWS_CONFIG";

/// Overrides `reference_area` from the configuration file.
pub const REFERENCE_AREA_ENV: &str = "TRIP_FLOWS_REFERENCE_AREA";

/// The documented default configuration, shipped with the binary.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../trip_flows.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {message}")]
    Parse { path: String, message: String },

    #[error("quantile must be between 0 and 1, got {value}")]
    InvalidQuantile { value: f64 },

    #[error("chunk_size must be at least 1")]
    InvalidChunkSize,

    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub reference_area: String,
    pub quantile: f64,
    pub chunk_size: usize,
    pub name_property: String,
    pub suburbs: Option<Vec<String>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reference_area: DEFAULT_REFERENCE_AREA.to_string(),
            quantile: DEFAULT_QUANTILE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            name_property: DEFAULT_NAME_PROPERTY.to_string(),
            suburbs: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    pipeline: PipelineConfig,
}

/// Values given on the command line. `None` leaves the configured value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub reference_area: Option<String>,
    pub quantile: Option<f64>,
    pub chunk_size: Option<usize>,
    pub name_property: Option<String>,
    pub suburbs: Option<Vec<String>>,
}

impl PipelineConfig {
    /// Parses the `[pipeline]` table of a TOML document. Missing keys keep
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is not valid TOML or
    /// contains unknown keys.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str::<ConfigFile>(text)
            .map(|file| file.pipeline)
            .map_err(|e| ConfigError::Parse {
                path: origin.to_string(),
                message: e.to_string(),
            })
    }

    /// Reads a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Loads the configuration file named by `explicit` or
    /// [`CONFIG_ENV`], falling back to defaults, then applies
    /// [`REFERENCE_AREA_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a named file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                log::info!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        config.apply_env(std::env::var(REFERENCE_AREA_ENV).ok());
        Ok(config)
    }

    fn apply_env(&mut self, reference_area: Option<String>) {
        if let Some(area) = reference_area.filter(|a| !a.trim().is_empty()) {
            log::debug!("{REFERENCE_AREA_ENV} overrides reference area with '{area}'");
            self.reference_area = area;
        }
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(area) = overrides.reference_area {
            self.reference_area = area;
        }
        if let Some(quantile) = overrides.quantile {
            self.quantile = quantile;
        }
        if let Some(chunk_size) = overrides.chunk_size {
            self.chunk_size = chunk_size;
        }
        if let Some(name_property) = overrides.name_property {
            self.name_property = name_property;
        }
        if overrides.suburbs.is_some() {
            self.suburbs = overrides.suburbs;
        }
        self
    }

    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid setting.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&self.quantile) {
            return Err(ConfigError::InvalidQuantile {
                value: self.quantile,
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize);
        }
        if self.reference_area.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "reference_area",
            });
        }
        if self.name_property.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "name_property",
            });
        }
        Ok(self)
    }

    #[must_use]
    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            reference_area: self.reference_area.clone(),
            quantile: self.quantile,
            suburbs: self.suburbs.clone(),
        }
    }
}

/// Splits a comma-separated `--suburbs` value. Suburb labels may contain
/// commas themselves, so `;` is accepted as the separator when present.
#[must_use]
pub fn parse_suburb_list(value: &str) -> Vec<String> {
    let separator = if value.contains(';') { ';' } else { ',' };
    value
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
