use anyhow::{Context, Result};
use std::path::PathBuf;

/// Get the vidstory config directory
pub fn vidstory_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("vidstory");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory at {}", config_dir.display()))?;

    Ok(config_dir)
}

/// Path of the main TOML configuration file
pub fn config_file_path() -> Result<PathBuf> {
    Ok(vidstory_config_dir()?.join("config.toml"))
}
