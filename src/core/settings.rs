use crate::camera::types::{FeedMode, FinalizeStrategy};
use crate::shared::paths::{ensure_dir, get_default_output_dir, get_storage_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub server_url: String,
    pub camera: u32,
    pub capture_fps: f64,
    pub strategy: FinalizeStrategy,
    pub feed_mode: FeedMode,
    pub tick_ms: u64,
    pub status_interval_ms: u64,
    pub max_status_failures: u32,
    /// `None` keeps the camera's own JPEG bytes.
    pub jpeg_quality: Option<u8>,
    pub upload_batch_size: usize,
    pub request_timeout_ms: u64,
    pub start_timeout_ms: u64,
    pub output_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            camera: 0,
            capture_fps: 60.0,
            strategy: FinalizeStrategy::Local,
            feed_mode: FeedMode::Poll,
            tick_ms: 16,
            status_interval_ms: 2000,
            max_status_failures: 3,
            jpeg_quality: None,
            upload_batch_size: 50,
            request_timeout_ms: 10_000,
            start_timeout_ms: 2000,
            output_dir: None,
        }
    }
}

impl AppSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms.max(100))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(get_default_output_dir)
    }

    /// Rejects values the recorder cannot work with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.capture_fps.is_finite() && self.capture_fps > 0.0) {
            return Err(SettingsError::Invalid(format!(
                "captureFps must be positive, got {}",
                self.capture_fps
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(SettingsError::Invalid(
                "requestTimeoutMs must be at least 1".to_string(),
            ));
        }
        if self.start_timeout_ms == 0 {
            return Err(SettingsError::Invalid(
                "startTimeoutMs must be at least 1".to_string(),
            ));
        }
        if self.upload_batch_size == 0 {
            return Err(SettingsError::Invalid(
                "uploadBatchSize must be at least 1".to_string(),
            ));
        }
        if let Some(quality) = self.jpeg_quality {
            if !(1..=100).contains(&quality) {
                return Err(SettingsError::Invalid(format!(
                    "jpegQuality must be within 1..=100, got {}",
                    quality
                )));
            }
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(SettingsError::Invalid(format!(
                "serverUrl must be an http(s) URL, got {}",
                self.server_url
            )));
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to write settings file: {0}")]
    WriteError(std::io::Error),
    #[error("Failed to parse settings: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

pub fn get_settings_path() -> PathBuf {
    get_storage_dir().join("settings.json")
}

/// Loads settings from `path`, falling back to defaults when the file is
/// missing or unreadable.
pub fn load_settings(path: &Path) -> AppSettings {
    if !path.exists() {
        return AppSettings::default();
    }

    match load_settings_from_file(path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(target: "system", "Ignoring settings file {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

fn load_settings_from_file(path: &Path) -> Result<AppSettings, SettingsError> {
    let contents = std::fs::read_to_string(path)?;
    let settings = serde_json::from_str(&contents)?;
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).map_err(SettingsError::WriteError)?;
    }

    let contents = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, contents).map_err(SettingsError::WriteError)?;
    Ok(())
}
