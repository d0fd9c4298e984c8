// Field-mapping presets
// Loaded from ~/.config/gapsort/presets/ (*.json, *.toml)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use gapsort_engine::{EngineError, FieldMapping, MappingStore};

pub const PRESETS_DIR: &str = "presets";

/// Get the default presets directory.
pub fn presets_dir() -> PathBuf {
    crate::config_dir().join(PRESETS_DIR)
}

#[derive(Deserialize)]
struct PresetFile {
    #[serde(default)]
    preset: Vec<FieldMapping>,
}

/// Read-only preset lookup backed by preset files.
///
/// A preset file is either a JSON array of `{"id", "name", "fields"}`
/// objects (`_id` accepted for `id`) or TOML with one `[[preset]]` table per
/// mapping. When an id appears twice, the later definition wins.
#[derive(Debug, Clone, Default)]
pub struct PresetStore {
    mappings: BTreeMap<String, FieldMapping>,
}

impl PresetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a single preset file or every `.json`/`.toml` file in a
    /// directory (sorted by name, not recursive).
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let mut store = Self::new();
        if path.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)
                .map_err(|e| EngineError::io(format!("{}: {e}", path.display())))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && preset_kind(p).is_some())
                .collect();
            files.sort();
            for file in files {
                store.load_file(&file)?;
            }
        } else {
            store.load_file(path)?;
        }
        log::info!("{} presets loaded from {}", store.len(), path.display());
        Ok(store)
    }

    /// Presets from [`presets_dir`], or an empty store when it does not exist.
    pub fn load_default() -> Result<Self, EngineError> {
        let dir = presets_dir();
        if dir.exists() {
            Self::load(&dir)
        } else {
            log::debug!("no presets directory at {}", dir.display());
            Ok(Self::new())
        }
    }

    fn load_file(&mut self, path: &Path) -> Result<(), EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::io(format!("{}: {e}", path.display())))?;
        let mappings = match preset_kind(path) {
            Some(PresetKind::Json) => parse_json(&contents),
            Some(PresetKind::Toml) => parse_toml(&contents),
            None => Err("expected a .json or .toml preset file".to_string()),
        }
        .map_err(|msg| EngineError::ConfigParse(format!("{}: {msg}", path.display())))?;

        for mapping in mappings {
            self.insert(mapping, path)?;
        }
        Ok(())
    }

    fn insert(&mut self, mapping: FieldMapping, origin: &Path) -> Result<(), EngineError> {
        if mapping.id.trim().is_empty() {
            return Err(EngineError::config(format!(
                "{}: preset without an id",
                origin.display()
            )));
        }
        if self.mappings.contains_key(&mapping.id) {
            log::warn!(
                "preset '{}' redefined in {}; using the later one",
                mapping.id,
                origin.display()
            );
        }
        self.mappings.insert(mapping.id.clone(), mapping);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldMapping> {
        self.mappings.values()
    }
}

impl MappingStore for PresetStore {
    fn get(&self, id: &str) -> Option<FieldMapping> {
        self.mappings.get(id).cloned()
    }

    fn ids(&self) -> Vec<String> {
        self.mappings.keys().cloned().collect()
    }
}

#[derive(Clone, Copy)]
enum PresetKind {
    Json,
    Toml,
}

fn preset_kind(path: &Path) -> Option<PresetKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "json" => Some(PresetKind::Json),
        "toml" => Some(PresetKind::Toml),
        _ => None,
    }
}

fn parse_json(contents: &str) -> Result<Vec<FieldMapping>, String> {
    serde_json::from_str(contents).map_err(|e| e.to_string())
}

fn parse_toml(contents: &str) -> Result<Vec<FieldMapping>, String> {
    toml::from_str::<PresetFile>(contents)
        .map(|file| file.preset)
        .map_err(|e| e.to_string())
}
