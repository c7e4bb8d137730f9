use crate::core::conda::validate_env_name;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SETTINGS_FILENAME: &str = "ftw_plugin_settings.json";
pub const DEFAULT_ENV_NAME: &str = "ftw_plugin";

fn default_env_name() -> String {
    DEFAULT_ENV_NAME.to_string()
}

/// Persisted conda location and environment name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub conda_path: Option<PathBuf>,
    #[serde(default = "default_env_name")]
    pub env_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            conda_path: None,
            env_name: default_env_name(),
        }
    }
}

/// Reads and writes [`Settings`] at a fixed path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("ftw-runner");
        Self::new(dir.join(SETTINGS_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files yield defaults; a stale conda path is dropped.
    pub fn load(&self) -> Settings {
        if !self.path.exists() {
            return Settings::default();
        }

        let parsed = std::fs::read_to_string(&self.path)
            .map_err(crate::utils::error::FtwError::from)
            .and_then(|content| Ok(serde_json::from_str::<Settings>(&content)?));

        match parsed {
            Ok(mut settings) => {
                if let Some(path) = &settings.conda_path {
                    if !path.exists() {
                        tracing::warn!(
                            "⚠️ Saved conda path {} no longer exists, ignoring it",
                            path.display()
                        );
                        settings.conda_path = None;
                    }
                }
                if validate_env_name(&settings.env_name).is_err() {
                    tracing::warn!(
                        "⚠️ Saved env name '{}' is invalid, using '{}'",
                        settings.env_name,
                        DEFAULT_ENV_NAME
                    );
                    settings.env_name = default_env_name();
                }
                settings
            }
            Err(e) => {
                tracing::warn!("Error loading settings from {}: {}", self.path.display(), e);
                Settings::default()
            }
        }
    }

    /// Creates the file on first use and overwrites it afterwards.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, json)?;
        tracing::debug!("Settings saved to {}", self.path.display());
        Ok(())
    }
}
