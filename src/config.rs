//! Runtime settings
//!
//! Loaded from, in priority order:
//! 1. Environment variables (highest)
//! 2. `~/.config/cyberkg/config.yaml` (or an explicit path)
//! 3. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-preview-05-20".to_string(),
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StixSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    /// ATT&CK domains fetched by `ingest attack` (enterprise, mobile, ics).
    pub domains: Vec<String>,
    /// Read `<domain>-attack.json` bundles from this directory instead of
    /// downloading them.
    pub bundle_dir: Option<PathBuf>,
}

impl Default for StixSettings {
    fn default() -> Self {
        Self {
            base_url: "https://raw.githubusercontent.com/mitre/cti/master".to_string(),
            timeout_secs: 30,
            domains: vec!["enterprise".to_string()],
            bundle_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub documents_dir: PathBuf,
    pub llm: LlmSettings,
    pub stix: StixSettings,
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
        Self {
            db_path: data_dir.join("cyberkg").join("cyberkg.db"),
            documents_dir: PathBuf::from("documents"),
            llm: LlmSettings::default(),
            stix: StixSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cyberkg").join("config.yaml"))
    }

    /// Load from `path` (or the default location), then apply environment
    /// overrides. A missing file yields defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut settings = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Environment variables override everything.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(path) = var("CYBERKG_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(key) = var("GEMINI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = var("MODEL_NAME") {
            self.llm.model = model;
        }
        if let Some(dir) = var("CYBERKG_DOCUMENTS_DIR") {
            self.documents_dir = PathBuf::from(dir);
        }
        if let Some(url) = var("CYBERKG_STIX_BASE_URL") {
            self.stix.base_url = url;
        }
        if let Some(dir) = var("CYBERKG_STIX_DIR") {
            self.stix.bundle_dir = Some(PathBuf::from(dir));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let settings = Settings::from_yaml("llm:\n  model: gemini-pro\nretry:\n  max_attempts: 5\n").unwrap();
        assert_eq!(settings.llm.model, "gemini-pro");
        assert_eq!(settings.llm.timeout_secs, 60);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.base_delay_ms, 100);
        assert_eq!(settings.stix.timeout_secs, 30);
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(Settings::from_yaml("  \n").unwrap(), Settings::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "llm: [unterminated").unwrap();
        assert!(matches!(Settings::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(settings.stix.base_url, StixSettings::default().base_url);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut settings = Settings::from_yaml("db_path: /tmp/from-file.db\n").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("CYBERKG_DB_PATH", "/tmp/from-env.db"),
            ("GEMINI_API_KEY", "secret"),
            ("MODEL_NAME", ""),
            ("CYBERKG_STIX_DIR", "/srv/cti"),
        ]);
        settings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.db_path, PathBuf::from("/tmp/from-env.db"));
        assert_eq!(settings.llm.api_key.as_deref(), Some("secret"));
        assert_eq!(settings.llm.model, LlmSettings::default().model);
        assert_eq!(settings.stix.bundle_dir, Some(PathBuf::from("/srv/cti")));
    }

    #[test]
    fn retry_settings_build_policy() {
        let policy = RetrySettings::default().policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
    }
}
