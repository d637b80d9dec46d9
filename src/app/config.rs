//! Application configuration
//!
//! Combines CLI flags with the layered map configuration.

use crate::config::MapConfig;
use anyhow::Result;
use std::path::Path;

/// Application configuration structure
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
    /// Map configuration after all layers are applied
    pub map: MapConfig,
}

impl AppConfig {
    /// Create a new application configuration, loading the map configuration
    /// from the working directory and environment.
    pub fn new(verbose: u8, config_file: Option<&Path>) -> Result<Self> {
        let working_dir = std::env::current_dir()
            .map_err(|e| anyhow::anyhow!("Failed to get current directory: {}", e))?;
        let map = MapConfig::load(&working_dir, config_file)?;

        Ok(Self { verbose, map })
    }

    /// Replace the map configuration
    pub fn with_map(mut self, map: MapConfig) -> Self {
        self.map = map;
        self
    }

    /// Get the log filter based on verbosity, falling back to the configured level
    pub fn log_level(&self) -> &str {
        match self.verbose {
            0 => self.map.log_level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            map: MapConfig::default(),
        }
    }
}
