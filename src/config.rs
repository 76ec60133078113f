use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::error::StoreError;

/// API settings persisted in `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
        }
    }
}

impl Config {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Copy safe to print or send to a browser.
    pub fn masked(&self) -> Self {
        let api_key = if !self.has_api_key() {
            String::new()
        } else if self.api_key.chars().count() <= 4 {
            // Too short to show any of it.
            "****".to_string()
        } else {
            let tail: String = self
                .api_key
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("****{}", tail)
        };
        Self {
            api_key,
            ..self.clone()
        }
    }
}

/// Reads and writes the config file at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Defaults when the file does not exist. A file that exists but is not
    /// valid JSON is an error.
    pub fn load(&self) -> Result<Config, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }
        let text = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        serde_json::from_str(&text).map_err(|e| StoreError::json(&self.path, e))
    }

    pub fn save(&self, config: &Config) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(config).map_err(|e| StoreError::json(&self.path, e))?;
        fs::write(&self.path, json).map_err(|e| StoreError::io(&self.path, e))?;
        info!(path = %self.path.display(), model = %config.model, "Config saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));

        let config = store.load().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.base_url, "https://api.deepseek.com");
        assert_eq!(config.model, "deepseek-chat");
        assert!(!config.has_api_key());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let config = Config {
            api_key: "k".to_string(),
            base_url: "https://x".to_string(),
            model: "m".to_string(),
        };

        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn test_saved_file_uses_expected_keys() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        store.save(&Config::default()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        let obj = raw.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert!(obj.contains_key("api_key"));
        assert!(obj.contains_key("base_url"));
        assert!(obj.contains_key("model"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let err = ConfigStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Json { .. }));
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"api_key": "sk-123"}"#).unwrap();

        let config = ConfigStore::new(&path).load().unwrap();
        assert_eq!(config.api_key, "sk-123");
        assert_eq!(config.model, "deepseek-chat");
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("config.json"));
        store.save(&Config::default()).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_masked_hides_key() {
        let config = Config {
            api_key: "sk-abcdef123456".to_string(),
            ..Config::default()
        };
        let masked = config.masked();
        assert_eq!(masked.api_key, "****3456");
        assert_eq!(masked.model, config.model);
        assert_eq!(Config::default().masked().api_key, "");
    }

    #[test]
    fn test_masked_never_reveals_short_key() {
        for key in ["k", "abcd", "密钥12"] {
            let config = Config {
                api_key: key.to_string(),
                ..Config::default()
            };
            assert_eq!(config.masked().api_key, "****", "key {key:?}");
        }

        let config = Config {
            api_key: "abcde".to_string(),
            ..Config::default()
        };
        assert_eq!(config.masked().api_key, "****bcde");
    }
}
