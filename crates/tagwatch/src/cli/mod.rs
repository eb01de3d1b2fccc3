//! Command-line interface
//!
//! Every command opens the catalog through [`CliContext`], does its work and
//! shuts the service down again. Watching commands stay in the foreground
//! until Ctrl-C.

pub mod catalog;
pub mod output;
pub mod tag;
pub mod watch;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tagwatch::config::default_config_path;
use tagwatch::{TagWatch, TagwatchConfig};
use tracing::info;

/// Global options shared by every command
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config_path: Option<PathBuf>,
    pub database: Option<PathBuf>,
}

impl CliContext {
    /// Load the config file (defaults when missing) and apply overrides.
    pub fn load_config(&self) -> Result<TagwatchConfig> {
        let path = self.config_path.clone().unwrap_or_else(default_config_path);
        let mut config = TagwatchConfig::load_or_default(&path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?;
        if let Some(database) = &self.database {
            config.database_path = database.clone();
        }
        Ok(config)
    }

    pub async fn open(&self) -> Result<TagWatch> {
        let config = self.load_config()?;
        let path = config.database_path.clone();
        TagWatch::open(config)
            .await
            .with_context(|| format!("Failed to open catalog: {}", path.display()))
    }
}

/// Block until the user interrupts, then stop every watch.
pub async fn wait_for_shutdown(tw: &TagWatch) -> Result<()> {
    println!("Watching for changes. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Interrupt received, shutting down");
    tw.shutdown().await;
    Ok(())
}
