use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";

pub const OPTIONS_FILE: &str = "options.yaml";
pub const PRESETS_DIR: &str = "presets";
pub const CONFIG_FILE: &str = "ai_config.json";

/// Credentials and endpoints for the chat and image providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub image_api_key: String,
    pub image_base_url: String,
    pub image_model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            image_api_key: String::new(),
            image_base_url: DEFAULT_IMAGE_BASE_URL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }
}

impl ProviderConfig {
    /// Reads `path`, falling back to defaults when it is missing or broken,
    /// then applies environment overrides.
    pub fn load(path: &Path) -> Self {
        Self::load_file(path).with_env_overrides(non_empty_env)
    }

    pub fn load_file(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match read_config(path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("ignoring provider config: {err:#}");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed writing {}", path.display()))?;
        Ok(())
    }

    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PROMPTSMITH_API_BASE") {
            self.base_url = value;
        }
        if let Some(value) = lookup("PROMPTSMITH_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = value;
        }
        if let Some(value) = lookup("PROMPTSMITH_MODEL") {
            self.model = value;
        }
        if let Some(value) = lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY")) {
            self.image_api_key = value;
        }
        if let Some(value) = lookup("GEMINI_API_BASE") {
            self.image_base_url = value;
        }
        if let Some(value) = lookup("PROMPTSMITH_IMAGE_MODEL") {
            self.image_model = value;
        }
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn is_image_configured(&self) -> bool {
        !self.image_api_key.trim().is_empty()
    }
}

fn read_config(path: &Path) -> anyhow::Result<ProviderConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    let parsed = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid provider config", path.display()))?;
    Ok(parsed)
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Where the options file, presets and provider config live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `explicit` wins, then `PROMPTSMITH_HOME`, then the user config dir.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(root) = explicit {
            return Ok(Self::new(root));
        }
        if let Some(home) = non_empty_env("PROMPTSMITH_HOME") {
            return Ok(Self::new(home));
        }
        let config_dir = dirs::config_dir()
            .context("could not determine a config directory; pass --data-dir")?;
        Ok(Self::new(config_dir.join("promptsmith")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options_file(&self) -> PathBuf {
        self.root.join(OPTIONS_FILE)
    }

    pub fn presets_dir(&self) -> PathBuf {
        self.root.join(PRESETS_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }
}
