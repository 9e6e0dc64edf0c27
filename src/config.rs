//! Recorder configuration
//!
//! Loaded once at startup and passed down explicitly; nothing reads it from
//! a global.

use crate::capture::screenshot::ImageFormat;
use crate::recorder::channel::{RecordingError, RecordingResult};
use crate::recorder::state::DEFAULT_STATE_FILE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Screen size used when the compositor reports no monitors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: i32,
    pub height: i32,
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Where session directories are written (`~` is expanded)
    pub output_dir: PathBuf,
    pub image_format: ImageFormat,
    /// Lossy compression quality, 1-100
    pub image_quality: u8,
    pub log_keys: bool,
    /// Maximum gap between keys of one group
    pub key_interval_ms: i64,
    pub countdown_secs: u32,
    pub capture_workers: usize,
    pub drain_timeout_ms: u64,
    pub topology_cooldown_ms: u64,
    pub poll_timeout_ms: u64,
    pub loop_interval_ms: u64,
    pub fallback_screen: ScreenSize,
    pub state_file: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("~/Pictures/wsr"),
            image_format: ImageFormat::Png,
            image_quality: 90,
            log_keys: true,
            key_interval_ms: 500,
            countdown_secs: 3,
            capture_workers: 2,
            drain_timeout_ms: 5000,
            topology_cooldown_ms: 5000,
            poll_timeout_ms: 500,
            loop_interval_ms: 50,
            fallback_screen: ScreenSize::default(),
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
        }
    }
}

impl RecorderConfig {
    /// `$WSR_CONFIG`, else `$XDG_CONFIG_HOME/wsr/wsr.json`
    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os("WSR_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("wsr").join("wsr.json"))
    }

    /// Load the user config, falling back to defaults when the file is
    /// missing or unreadable. Invalid values are an error.
    pub fn load() -> RecordingResult<Self> {
        let config = match Self::config_path() {
            Some(path) if path.exists() => match Self::load_from_file(&path) {
                Ok(config) => {
                    tracing::info!("Loaded config: {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                tracing::debug!("Using built-in default config");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config.expanded())
    }

    pub fn load_from_file(path: &Path) -> RecordingResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn validate(&self) -> RecordingResult<()> {
        if self.key_interval_ms < 0 {
            return Err(RecordingError::InvalidConfig(format!(
                "key_interval_ms must be >= 0, got {}",
                self.key_interval_ms
            )));
        }
        if !(1..=100).contains(&self.image_quality) {
            return Err(RecordingError::InvalidConfig(format!(
                "image_quality must be within 1-100, got {}",
                self.image_quality
            )));
        }
        if self.fallback_screen.width <= 0 || self.fallback_screen.height <= 0 {
            return Err(RecordingError::InvalidConfig(format!(
                "fallback_screen must be positive, got {}x{}",
                self.fallback_screen.width, self.fallback_screen.height
            )));
        }
        if self.loop_interval_ms == 0 || self.poll_timeout_ms == 0 {
            return Err(RecordingError::InvalidConfig(
                "loop_interval_ms and poll_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy with `~` expanded in path values
    pub fn expanded(mut self) -> Self {
        self.output_dir = expand_home(&self.output_dir);
        self.state_file = expand_home(&self.state_file);
        self
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn topology_cooldown(&self) -> Duration {
        Duration::from_millis(self.topology_cooldown_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_interval_ms)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let rest = match path.strip_prefix("~") {
        Ok(rest) => rest,
        Err(_) => return path.to_path_buf(),
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
