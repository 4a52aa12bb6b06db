//! Persisted user settings (download folder, last quality, theme).
//!
//! Settings are best effort: a missing or corrupt file means defaults, and a
//! failed write is logged and otherwise ignored.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::model::{QualityPreset, Theme};

/// Overrides the settings file location
pub const SETTINGS_ENV: &str = "TUBEGRAB_SETTINGS";

const APP_DIR: &str = "tubegrab";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Folder downloads are written into
    pub download_path: PathBuf,
    /// Preset selected for the most recent download
    pub last_quality: QualityPreset,
    pub theme: Theme,
    /// yt-dlp executable, looked up on PATH when not absolute
    pub yt_dlp_path: String,
    /// Passed to yt-dlp as `--ffmpeg-location` when set
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            last_quality: QualityPreset::default(),
            theme: Theme::default(),
            yt_dlp_path: "yt-dlp".to_string(),
            ffmpeg_path: None,
        }
    }
}

fn default_download_path() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .map(|d| d.join("YouTube"))
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}

/// Reads and writes [`Settings`] as JSON at a fixed path
#[derive(Clone, Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$TUBEGRAB_SETTINGS`, else `<config dir>/tubegrab/settings.json`, else `./settings.json`.
    pub fn default_location() -> Self {
        let path = std::env::var_os(SETTINGS_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join(APP_DIR).join(SETTINGS_FILE)))
            .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads settings. On a missing or unreadable file the defaults are used and written back.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(settings) => {
                tracing::debug!(path = %self.path.display(), "loaded settings");
                settings
            }
            Err(err) => {
                tracing::info!(path = %self.path.display(), %err, "using default settings");
                let settings = Settings::default();
                self.save(&settings);
                settings
            }
        }
    }

    pub fn try_load(&self) -> Result<Settings, SettingsError> {
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes settings, logging and swallowing any failure.
    pub fn save(&self, settings: &Settings) {
        if let Err(err) = self.try_save(settings) {
            tracing::warn!(path = %self.path.display(), %err, "could not save settings");
        }
    }

    pub fn try_save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Creates the download folder if it does not exist yet.
pub fn ensure_download_dir(path: &Path) {
    if let Err(err) = fs::create_dir_all(path) {
        tracing::warn!(path = %path.display(), %err, "could not create download folder");
    }
}
