use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::paths;

pub const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// API key for the generation service (overridden by GEMINI_API_KEY / API_KEY)
    pub api_key: Option<String>,
    /// Base URL of the generation REST API
    pub api_base_url: String,
    /// Seconds between generation status checks
    pub poll_interval_secs: u64,
    /// Give up polling after this many seconds (unset = wait indefinitely)
    pub poll_timeout_secs: Option<u64>,
    /// Abort a render after this many seconds (unset = wait indefinitely)
    pub render_timeout_secs: Option<u64>,
    /// Canonical output frame width
    pub frame_width: u32,
    /// Canonical output frame height
    pub frame_height: u32,
    /// Caption font size in pixels
    pub font_size: u32,
    /// Optional font file for captions (defaults to fontconfig lookup)
    pub font_file: Option<PathBuf>,
    /// Default file name used when exporting a render
    pub export_file_name: String,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: Self::DEFAULT_API_BASE_URL.to_string(),
            poll_interval_secs: Self::DEFAULT_POLL_INTERVAL_SECS,
            poll_timeout_secs: None,
            render_timeout_secs: None,
            frame_width: Self::DEFAULT_FRAME_WIDTH,
            frame_height: Self::DEFAULT_FRAME_HEIGHT,
            font_size: Self::DEFAULT_FONT_SIZE,
            font_file: None,
            export_file_name: Self::DEFAULT_EXPORT_FILE_NAME.to_string(),
        }
    }
}

impl StudioConfig {
    pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
    pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
    pub const DEFAULT_FRAME_WIDTH: u32 = 1280;
    pub const DEFAULT_FRAME_HEIGHT: u32 = 720;
    pub const DEFAULT_FONT_SIZE: u32 = 48;
    pub const DEFAULT_EXPORT_FILE_NAME: &str = "vidstory-pro-final-video.mp4";

    pub fn load() -> Result<Self> {
        Self::load_from_path(paths::config_file_path()?)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let config = Self::default();
            config.save_to_path(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut config: Self = toml::from_str(&contents).context("parsing config")?;
        config.sanitize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }

        let toml = toml::to_string_pretty(self).context("serializing config")?;
        fs::write(path, toml).with_context(|| format!("writing config to {}", path.display()))?;
        Ok(())
    }

    fn sanitize(&mut self) {
        if self.poll_interval_secs == 0 {
            self.poll_interval_secs = Self::DEFAULT_POLL_INTERVAL_SECS;
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            self.frame_width = Self::DEFAULT_FRAME_WIDTH;
            self.frame_height = Self::DEFAULT_FRAME_HEIGHT;
        }
        if self.font_size == 0 {
            self.font_size = Self::DEFAULT_FONT_SIZE;
        }
        if self.export_file_name.trim().is_empty() {
            self.export_file_name = Self::DEFAULT_EXPORT_FILE_NAME.to_string();
        }
    }

    /// API key from the environment, falling back to the config file.
    pub fn resolve_api_key(&self) -> Option<String> {
        API_KEY_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
            .or_else(|| self.api_key.clone().filter(|key| !key.trim().is_empty()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_secs.map(Duration::from_secs)
    }

    pub fn render_timeout(&self) -> Option<Duration> {
        self.render_timeout_secs.map(Duration::from_secs)
    }

    pub fn frame_width(&self) -> u32 {
        if self.frame_width == 0 {
            Self::DEFAULT_FRAME_WIDTH
        } else {
            self.frame_width
        }
    }

    pub fn frame_height(&self) -> u32 {
        if self.frame_height == 0 {
            Self::DEFAULT_FRAME_HEIGHT
        } else {
            self.frame_height
        }
    }

    pub fn font_size(&self) -> u32 {
        if self.font_size == 0 {
            Self::DEFAULT_FONT_SIZE
        } else {
            self.font_size
        }
    }
}
