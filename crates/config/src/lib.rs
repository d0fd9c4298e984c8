// Configuration loading

pub mod presets;
pub mod settings;

use std::path::PathBuf;

pub use presets::PresetStore;
pub use settings::{load_settings, LoadedSettings};

/// `~/.config/gapsort` (or the platform equivalent).
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gapsort")
}
