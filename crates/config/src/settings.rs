// Engine settings
// Loaded from ~/.config/gapsort/settings.toml

use std::fs;
use std::path::{Path, PathBuf};

use gapsort_engine::{EngineConfig, EngineError};

pub const SETTINGS_FILE: &str = "settings.toml";

/// Settings plus the file they came from (`None` means built-in defaults).
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSettings {
    pub config: EngineConfig,
    pub source: Option<PathBuf>,
}

/// Get the default settings file path.
pub fn settings_path() -> PathBuf {
    crate::config_dir().join(SETTINGS_FILE)
}

/// Load settings from `explicit`, or from [`settings_path`] when none is
/// given. A missing default file yields the defaults; a missing explicit
/// file is an error. Loaded settings are validated.
pub fn load_settings(explicit: Option<&Path>) -> Result<LoadedSettings, EngineError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = settings_path();
            if !path.exists() {
                log::debug!("no settings at {}, using defaults", path.display());
                return Ok(LoadedSettings {
                    config: EngineConfig::default(),
                    source: None,
                });
            }
            path
        }
    };

    let contents = fs::read_to_string(&path)
        .map_err(|e| EngineError::io(format!("{}: {e}", path.display())))?;
    let config = EngineConfig::from_toml(&contents).map_err(|e| match e {
        EngineError::ConfigParse(msg) => {
            EngineError::ConfigParse(format!("{}: {msg}", path.display()))
        }
        other => other,
    })?;
    log::info!("settings loaded from {}", path.display());

    Ok(LoadedSettings {
        config,
        source: Some(path),
    })
}

/// Render settings as the TOML a settings file would contain.
pub fn render(config: &EngineConfig) -> Result<String, EngineError> {
    toml::to_string_pretty(config).map_err(|e| EngineError::config(e.to_string()))
}
