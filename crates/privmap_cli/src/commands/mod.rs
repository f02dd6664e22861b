//! CLI commands.

pub mod collect;
pub mod init;
pub mod paths;
pub mod process;
pub mod verify;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use privmap_core::Config;
use std::path::Path;
use std::time::Duration;

/// Reads and validates the configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// A steady spinner with a message.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
