use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use chrono::{DateTime, Local};
use serde_json::Value;

const PRESET_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq)]
pub struct PresetEntry {
    pub name: String,
    pub path: PathBuf,
    pub last_modified: SystemTime,
}

impl PresetEntry {
    pub fn modified_label(&self) -> String {
        DateTime::<Local>::from(self.last_modified)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }
}

/// Named documents stored one JSON file per preset.
#[derive(Debug, Clone)]
pub struct PresetStore {
    dir: PathBuf,
}

impl PresetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let store = Self { dir: dir.into() };
        if let Err(err) = std::fs::create_dir_all(&store.dir) {
            log::warn!(
                "could not create presets directory {}: {err}",
                store.dir.display()
            );
        }
        store
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Most recently modified first.
    pub fn list_presets(&self) -> Vec<PresetEntry> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("failed to list presets in {}: {err}", self.dir.display());
                return Vec::new();
            }
        };
        let mut presets = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(PRESET_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let Ok(last_modified) = entry.metadata().and_then(|meta| meta.modified()) else {
                continue;
            };
            presets.push(PresetEntry {
                name: name.to_string(),
                path: path.clone(),
                last_modified,
            });
        }
        presets.sort_by(|a, b| match b.last_modified.cmp(&a.last_modified) {
            Ordering::Equal => a.name.cmp(&b.name),
            other => other,
        });
        presets
    }

    pub fn save(&self, name: &str, document: &Value) -> bool {
        self.save_named(name, document).is_some()
    }

    /// Saves under the sanitized form of `name`, returning the name used.
    pub fn save_named(&self, name: &str, document: &Value) -> Option<String> {
        let safe_name = sanitize_preset_name(name);
        let path = self.preset_path(&safe_name);
        match write_document(&path, document) {
            Ok(()) => Some(safe_name),
            Err(err) => {
                log::warn!("failed to save preset '{safe_name}': {err:#}");
                None
            }
        }
    }

    pub fn load(&self, name: &str) -> Option<Value> {
        let path = self.existing_path(name)?;
        match read_document(&path) {
            Ok(document) => Some(document),
            Err(err) => {
                log::warn!("failed to load preset '{name}': {err:#}");
                None
            }
        }
    }

    pub fn delete(&self, name: &str) -> bool {
        let Some(path) = self.existing_path(name) else {
            return false;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("failed to delete preset '{name}': {err}");
                false
            }
        }
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> bool {
        let Some(old_path) = self.existing_path(old_name) else {
            return false;
        };
        let new_name = clean_name(new_name);
        if new_name.is_empty() {
            return false;
        }
        let new_path = self.preset_path(&new_name);
        if new_path.exists() {
            return false;
        }
        match std::fs::rename(&old_path, &new_path) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("failed to rename preset '{old_name}' to '{new_name}': {err}");
                false
            }
        }
    }

    fn preset_path(&self, safe_name: &str) -> PathBuf {
        self.dir.join(format!("{safe_name}.{PRESET_EXTENSION}"))
    }

    // Names are looked up through the same character filter used on save so
    // that a name can never reach outside the presets directory.
    fn existing_path(&self, name: &str) -> Option<PathBuf> {
        let safe_name = clean_name(name);
        if safe_name.is_empty() {
            return None;
        }
        let path = self.preset_path(&safe_name);
        path.is_file().then_some(path)
    }
}

fn is_allowed_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '(' | ')' | '（' | '）')
}

fn clean_name(name: &str) -> String {
    name.chars()
        .filter(|c| is_allowed_name_char(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Keeps alphanumerics, spaces, `-`, `_` and parentheses. An empty result
/// falls back to a timestamped name.
pub fn sanitize_preset_name(name: &str) -> String {
    let cleaned = clean_name(name);
    if cleaned.is_empty() {
        return format!("preset_{}", Local::now().format("%Y%m%d_%H%M%S"));
    }
    cleaned
}

fn read_document(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(parsed)
}

fn write_document(path: &Path, document: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(document)?)
        .with_context(|| format!("failed writing {}", path.display()))?;
    Ok(())
}
