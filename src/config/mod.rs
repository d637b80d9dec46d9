//! Configuration for the map primitive
//!
//! Settings are layered with increasing precedence:
//!
//! 1. Hardcoded defaults
//! 2. User config file (`<config dir>/thorns/config.toml`)
//! 3. Project config file (`./thorns.toml`, or an explicit path)
//! 4. Environment variables (`THORNS_*`)

use crate::error::{ErrorCode, ErrorExt, Result, ThornsError};
use crate::map::backend::{default_workers, Backend};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Valid log levels for configuration validation.
pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Project config file name looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "thorns.toml";

pub const ENV_BACKEND: &str = "THORNS_BACKEND";
pub const ENV_WORKERS: &str = "THORNS_WORKERS";
pub const ENV_SHOW_STATUS: &str = "THORNS_SHOW_STATUS";
pub const ENV_LOG_LEVEL: &str = "THORNS_LOG_LEVEL";

/// Effective configuration for map calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapConfig {
    /// Backend requested for top-level map calls.
    pub backend: Backend,

    /// Worker count for the threads backend. Defaults to available parallelism.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Publish progress bar and terminal title for top-level calls.
    pub show_status: bool,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            workers: None,
            show_status: true,
            log_level: "info".to_string(),
        }
    }
}

/// One configuration layer. Unset fields leave the layer below untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default)]
    pub backend: Option<Backend>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub show_status: Option<bool>,
    #[serde(default)]
    pub log_level: Option<String>,
}

impl ConfigLayer {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).to_config_error_with_code(
            ErrorCode::CONFIG_PARSE_ERROR,
            "invalid TOML configuration",
            None,
        )
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            let code = if e.kind() == std::io::ErrorKind::NotFound {
                ErrorCode::CONFIG_NOT_FOUND
            } else {
                ErrorCode::CONFIG_GENERIC
            };
            ThornsError::config_with_code(
                code,
                format!("cannot read {}", path.display()),
                None,
            )
            .with_source(e)
        })?;
        Self::from_toml_str(&content).map_err(|e| e.with_context(path.display()))
    }

    /// Build a layer from `THORNS_*` variables returned by `lookup`.
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = lookup(ENV_BACKEND)
            .map(|v| v.parse::<Backend>())
            .transpose()?;

        let workers = lookup(ENV_WORKERS)
            .map(|v| {
                v.trim().parse::<usize>().to_config_error_with_code(
                    ErrorCode::CONFIG_INVALID_WORKERS,
                    format!("{} must be a positive integer, got '{}'", ENV_WORKERS, v),
                    Some("workers"),
                )
            })
            .transpose()?;

        let show_status = lookup(ENV_SHOW_STATUS)
            .map(|v| {
                parse_flag(&v).ok_or_else(|| {
                    ThornsError::config_with_code(
                        ErrorCode::CONFIG_INVALID_VALUE,
                        format!("{} must be a boolean, got '{}'", ENV_SHOW_STATUS, v),
                        Some("show_status".to_string()),
                    )
                })
            })
            .transpose()?;

        let log_level = lookup(ENV_LOG_LEVEL).map(|v| v.trim().to_ascii_lowercase());

        Ok(Self {
            backend,
            workers,
            show_status,
            log_level,
        })
    }

    /// Build a layer from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl MapConfig {
    /// Apply a layer on top of this configuration.
    pub fn merge(&mut self, layer: ConfigLayer) {
        if let Some(backend) = layer.backend {
            self.backend = backend;
        }
        if let Some(workers) = layer.workers {
            self.workers = Some(workers);
        }
        if let Some(show_status) = layer.show_status {
            self.show_status = show_status;
        }
        if let Some(log_level) = layer.log_level {
            self.log_level = log_level;
        }
    }

    /// Check value ranges after all layers are applied.
    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(ThornsError::config_with_code(
                ErrorCode::CONFIG_INVALID_WORKERS,
                "workers must be at least 1",
                Some("workers".to_string()),
            ));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ThornsError::config_with_code(
                ErrorCode::CONFIG_INVALID_LOG_LEVEL,
                format!(
                    "unknown log level '{}' (expected one of {})",
                    self.log_level,
                    VALID_LOG_LEVELS.join(", ")
                ),
                Some("log_level".to_string()),
            ));
        }
        Ok(())
    }

    /// Worker count the threads backend will use.
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers).max(1)
    }

    /// Defaults plus environment variables only.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.merge(ConfigLayer::from_env()?);
        config.validate()?;
        Ok(config)
    }

    /// Load all layers.
    ///
    /// With `explicit` set, that file replaces the project file lookup and must
    /// exist. Missing user or project files are skipped.
    pub fn load(working_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        Self::load_with(
            user_config_path().as_deref(),
            working_dir,
            explicit,
            |key| std::env::var(key).ok(),
        )
    }

    /// [`MapConfig::load`] with every input injected.
    pub fn load_with<F>(
        user_file: Option<&Path>,
        working_dir: &Path,
        explicit: Option<&Path>,
        lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = user_file.filter(|p| p.exists()) {
            debug!("Loading user config from {}", path.display());
            config.merge(ConfigLayer::from_file(path)?);
        }

        match explicit {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                config.merge(ConfigLayer::from_file(path)?);
            }
            None => {
                let path = working_dir.join(PROJECT_CONFIG_FILE);
                if path.exists() {
                    debug!("Loading project config from {}", path.display());
                    config.merge(ConfigLayer::from_file(&path)?);
                }
            }
        }

        config.merge(ConfigLayer::from_env_with(lookup)?);
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).to_config_error("cannot serialize configuration")
    }
}

/// Location of the per-user config file, if the platform has one.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "thorns").map(|dirs| dirs.config_dir().join("config.toml"))
}
