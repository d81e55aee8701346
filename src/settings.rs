use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    canvas::FitPolicy,
    model_download::{ModelKind, default_model_path},
    types::{DrawColor, StrokeWidth},
};

const APP_DIR: &str = "air-canvas";
const SETTINGS_FILE: &str = "settings.json";
const DATA_DIR_ENV: &str = "AIR_CANVAS_DATA_DIR";

/// User-tunable defaults, stored as JSON in the platform config directory.
/// Missing fields take their default, so older files keep loading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Must match how the preview is laid out.
    pub fit_policy: FitPolicy,
    pub color: DrawColor,
    pub stroke_width: StrokeWidth,
    /// Flip horizontally, for user-facing cameras.
    pub mirror: bool,
    pub camera_rotation: u32,
    pub min_confidence: f32,
    pub palm_model_path: PathBuf,
    #[serde(alias = "model_path")]
    pub handpose_model_path: PathBuf,
    pub data_dir: PathBuf,
    /// Local profile signed in at startup.
    pub profile_email: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fit_policy: FitPolicy::Fill,
            color: DrawColor::default(),
            stroke_width: StrokeWidth::default(),
            mirror: true,
            camera_rotation: 0,
            min_confidence: 0.5,
            palm_model_path: default_model_path(ModelKind::PalmDetector),
            handpose_model_path: default_model_path(ModelKind::Handpose),
            data_dir: default_data_dir(),
            profile_email: "local@air-canvas".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from the config directory, falling back to defaults.
    /// `AIR_CANVAS_DATA_DIR` overrides the stored data directory.
    pub fn load() -> Self {
        let mut settings = match settings_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|err| {
                log::warn!("ignoring unreadable settings at {}: {err:#}", path.display());
                Self::default()
            }),
            _ => Self::default(),
        };

        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            settings.data_dir = PathBuf::from(dir);
        }
        settings.camera_rotation %= 360;
        settings
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = settings_path().context("no config directory on this platform")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }
}

fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("air-canvas-settings-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn save_and_load_preserve_values() {
        let path = temp_file("settings.json");
        let settings = Settings {
            fit_policy: FitPolicy::Fit,
            color: DrawColor::Cyan,
            stroke_width: StrokeWidth::new(12.0),
            mirror: false,
            ..Settings::default()
        };

        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let path = temp_file("partial.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{ "color": "red", "stroke_width": 99.0 }"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.color, DrawColor::Red);
        assert_eq!(settings.stroke_width.get(), StrokeWidth::MAX);
        assert_eq!(settings.fit_policy, FitPolicy::Fill);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
