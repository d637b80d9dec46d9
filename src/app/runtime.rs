//! Runtime initialization and setup

use crate::app::{config::AppConfig, logging::init_logging};
use anyhow::Result;
use std::path::Path;
use tracing::debug;

/// Load configuration and initialize logging
pub fn initialize_app(verbose: u8, config_file: Option<&Path>) -> Result<AppConfig> {
    let config = AppConfig::new(verbose, config_file)?;
    init_logging(&config);

    debug!(
        "Map defaults: backend={} workers={} show_status={}",
        config.map.backend,
        config.map.effective_workers(),
        config.map.show_status
    );

    Ok(config)
}
