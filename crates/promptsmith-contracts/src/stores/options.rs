use std::path::{Path, PathBuf};

use anyhow::Context;
use indexmap::IndexMap;
use serde_yaml::Value as YamlValue;

pub type OptionsMap = IndexMap<String, Vec<String>>;

/// Per-field suggestion lists persisted as one human-editable YAML file.
///
/// Every call reads the file fresh, so hand edits made while the tool runs are
/// picked up. I/O problems are logged and never surface to the caller: reads
/// degrade to an empty view and mutating calls report `false`.
#[derive(Debug, Clone)]
pub struct OptionsStore {
    path: PathBuf,
}

impl OptionsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let store = Self { path: path.into() };
        if !store.path.exists() {
            if let Err(err) = write_options(&store.path, &OptionsMap::new()) {
                log::warn!(
                    "could not create options file {}: {err:#}",
                    store.path.display()
                );
            }
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn all_options(&self) -> OptionsMap {
        match read_options(&self.path) {
            Ok(options) => options,
            Err(err) => {
                log::warn!("failed to load options from {}: {err:#}", self.path.display());
                OptionsMap::new()
            }
        }
    }

    pub fn get_options(&self, field_name: &str) -> Vec<String> {
        self.all_options()
            .swap_remove(field_name)
            .unwrap_or_default()
    }

    pub fn add_option(&self, field_name: &str, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        let Some(mut options) = self.load_for_update() else {
            return false;
        };
        let entries = options.entry(field_name.to_string()).or_default();
        if entries.iter().any(|existing| existing == value) {
            return false;
        }
        entries.push(value.to_string());
        self.persist(&options)
    }

    pub fn remove_option(&self, field_name: &str, value: &str) -> bool {
        let Some(mut options) = self.load_for_update() else {
            return false;
        };
        let Some(entries) = options.get_mut(field_name) else {
            return false;
        };
        let Some(idx) = entries.iter().position(|existing| existing == value) else {
            return false;
        };
        entries.remove(idx);
        self.persist(&options)
    }

    /// Replaces `old_value` in place, keeping its position in the list.
    pub fn update_option(&self, field_name: &str, old_value: &str, new_value: &str) -> bool {
        let new_value = new_value.trim();
        if new_value.is_empty() {
            return false;
        }
        let Some(mut options) = self.load_for_update() else {
            return false;
        };
        let Some(entries) = options.get_mut(field_name) else {
            return false;
        };
        if entries.iter().any(|existing| existing == new_value) {
            return false;
        }
        let Some(idx) = entries.iter().position(|existing| existing == old_value) else {
            return false;
        };
        entries[idx] = new_value.to_string();
        self.persist(&options)
    }

    // A file that fails to load is left alone rather than overwritten.
    fn load_for_update(&self) -> Option<OptionsMap> {
        match read_options(&self.path) {
            Ok(options) => Some(options),
            Err(err) => {
                log::warn!(
                    "not updating options in {}: {err:#}",
                    self.path.display()
                );
                None
            }
        }
    }

    fn persist(&self, options: &OptionsMap) -> bool {
        match write_options(&self.path, options) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("failed to save options to {}: {err:#}", self.path.display());
                false
            }
        }
    }
}

fn read_options(path: &Path) -> anyhow::Result<OptionsMap> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(OptionsMap::new());
    }
    let parsed: YamlValue = serde_yaml::from_str(&raw)
        .with_context(|| format!("{} is not valid YAML", path.display()))?;
    let mut options = OptionsMap::new();
    let YamlValue::Mapping(mapping) = parsed else {
        return Ok(options);
    };
    for (key, value) in mapping {
        let Some(field) = yaml_scalar_text(&key) else {
            continue;
        };
        let entries = match value {
            YamlValue::Sequence(items) => items.iter().filter_map(yaml_scalar_text).collect(),
            other => yaml_scalar_text(&other).into_iter().collect(),
        };
        options.insert(field, entries);
    }
    Ok(options)
}

fn yaml_scalar_text(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(text) => Some(text.clone()),
        YamlValue::Number(number) => Some(number.to_string()),
        YamlValue::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn write_options(path: &Path, options: &OptionsMap) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_yaml::to_string(options)?)
        .with_context(|| format!("failed writing {}", path.display()))?;
    Ok(())
}
