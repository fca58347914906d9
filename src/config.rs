//! Configuration — layered `GuardConfig` loading.
//!
//! ## Configuration hierarchy
//!
//! Resolved in order (later wins):
//!
//! 1. Compiled secure defaults
//! 2. An optional config file (`ipi-guard.toml`, `.yaml`, or `.json`)
//! 3. Optional environment variable overrides (`IPI_GUARD_*`)
//!
//! ```rust,ignore
//! use ipi_guard::config::GuardConfigBuilder;
//!
//! let config = GuardConfigBuilder::new()
//!     .with_file("config/ipi-guard.toml")?
//!     .with_env()
//!     .build()?;
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Errors that can occur while building a [`GuardConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file at {path}: {source}")]
    FileRead {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse the configuration file's contents.
    #[error("failed to parse {format} config: {source}")]
    ParseError {
        /// Format that failed to parse (YAML, TOML, JSON).
        format: String,
        /// Underlying parse error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Unsupported or unrecognized configuration file extension.
    #[error("unsupported config file format: {message}")]
    UnsupportedFormat {
        /// Description of the problem.
        message: String,
    },
    /// Configuration validation failed.
    #[error("config validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
    /// An environment variable could not be parsed.
    #[error("failed to parse environment variable {key}: {message}")]
    EnvParse {
        /// Environment variable key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// What the orchestrator does when attribution itself fails (proxy
/// failure or inconsistency), as opposed to a clean negative detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnAttributionFailure {
    /// Return the original action unchanged, `was_defended = false`.
    Passthrough,
    /// Return a stripped action, `was_defended = true`.
    Block,
}

impl Default for OnAttributionFailure {
    fn default() -> Self {
        Self::Passthrough
    }
}

/// The seven tunables that govern guard behavior — nothing more.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GuardConfig {
    /// Detection margin τ used by the dominance-shift rule. Must be non-negative.
    #[validate(range(min = 0.0))]
    pub margin_tau: f64,
    /// Tool names that bypass the pipeline entirely.
    #[serde(default)]
    pub privileged_tools: HashSet<String>,
    /// Whether to mask chain-of-thought before scoring.
    pub mask_cot_for_scoring: bool,
    /// Whether to mask chain-of-thought during regeneration.
    pub enable_cot_masking: bool,
    /// Whether to sanitize flagged spans before regeneration.
    pub enable_sanitization: bool,
    /// Bound on in-flight proxy scoring calls; `None` means unbounded.
    #[validate(range(min = 1))]
    pub max_loo_batch_size: Option<usize>,
    /// Policy applied when attribution itself fails.
    pub on_attribution_failure: OnAttributionFailure,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            margin_tau: 0.0,
            privileged_tools: HashSet::new(),
            mask_cot_for_scoring: true,
            enable_cot_masking: true,
            enable_sanitization: true,
            max_loo_batch_size: None,
            on_attribution_failure: OnAttributionFailure::default(),
        }
    }
}

/// Builder for constructing a [`GuardConfig`] from multiple sources.
#[derive(Debug, Default)]
pub struct GuardConfigBuilder {
    base: GuardConfig,
    use_env: bool,
}

impl GuardConfigBuilder {
    /// Start from compiled secure defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: GuardConfig::default(),
            use_env: false,
        }
    }

    /// Load configuration from a file, auto-detecting format by extension
    /// (`.toml`, `.yaml`/`.yml`, `.json`). Replaces every field loaded so
    /// far with the file's contents.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or its
    /// extension is not recognized.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config: GuardConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                    format: "YAML".to_string(),
                    source: Box::new(e),
                })?
            }
            Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                format: "TOML".to_string(),
                source: Box::new(e),
            })?,
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                    format: "JSON".to_string(),
                    source: Box::new(e),
                })?
            }
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    message: "file extension must be .toml, .yaml, .yml, or .json".to_string(),
                });
            }
        };

        self.base = config;
        Ok(self)
    }

    /// Enable loading overrides from `IPI_GUARD_*` environment variables
    /// (via a `.env` file, if present, then the process environment).
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Build the final config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an environment variable fails to parse or
    /// the resulting config fails validation.
    pub fn build(mut self) -> Result<GuardConfig, ConfigError> {
        if self.use_env {
            dotenvy::dotenv().ok();

            if let Ok(value) = std::env::var("IPI_GUARD_MARGIN_TAU") {
                self.base.margin_tau = value.parse().map_err(|_| ConfigError::EnvParse {
                    key: "IPI_GUARD_MARGIN_TAU".to_string(),
                    message: "must be a non-negative floating point number".to_string(),
                })?;
            }

            if let Ok(value) = std::env::var("IPI_GUARD_PRIVILEGED_TOOLS") {
                self.base.privileged_tools =
                    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
            }

            if let Ok(value) = std::env::var("IPI_GUARD_MASK_COT_FOR_SCORING") {
                self.base.mask_cot_for_scoring = parse_bool_env(&value, "IPI_GUARD_MASK_COT_FOR_SCORING")?;
            }

            if let Ok(value) = std::env::var("IPI_GUARD_ENABLE_COT_MASKING") {
                self.base.enable_cot_masking = parse_bool_env(&value, "IPI_GUARD_ENABLE_COT_MASKING")?;
            }

            if let Ok(value) = std::env::var("IPI_GUARD_ENABLE_SANITIZATION") {
                self.base.enable_sanitization = parse_bool_env(&value, "IPI_GUARD_ENABLE_SANITIZATION")?;
            }

            if let Ok(value) = std::env::var("IPI_GUARD_MAX_LOO_BATCH_SIZE") {
                self.base.max_loo_batch_size =
                    Some(value.parse().map_err(|_| ConfigError::EnvParse {
                        key: "IPI_GUARD_MAX_LOO_BATCH_SIZE".to_string(),
                        message: "must be a positive integer".to_string(),
                    })?);
            }

            if let Ok(value) = std::env::var("IPI_GUARD_ON_ATTRIBUTION_FAILURE") {
                self.base.on_attribution_failure = match value.to_lowercase().as_str() {
                    "passthrough" => OnAttributionFailure::Passthrough,
                    "block" => OnAttributionFailure::Block,
                    _ => {
                        return Err(ConfigError::EnvParse {
                            key: "IPI_GUARD_ON_ATTRIBUTION_FAILURE".to_string(),
                            message: "must be 'passthrough' or 'block'".to_string(),
                        });
                    }
                };
            }
        }

        self.base.validate()?;
        Ok(self.base)
    }
}

fn parse_bool_env(value: &str, key: &str) -> Result<bool, ConfigError> {
    value.parse().map_err(|_| ConfigError::EnvParse {
        key: key.to_string(),
        message: "must be 'true' or 'false'".to_string(),
    })
}
