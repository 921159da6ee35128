use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const AVAILABLE_MODELS: &[&str] = &["gpt-3.5-turbo", "gpt-4", "gpt-4-turbo", "gpt-4o"];
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_API_BASE: &str = reply_client::DEFAULT_API_BASE;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

const CONFIG_FILE_NAME: &str = "config.toml";
const LOCAL_CONFIG_FILE: &str = "echotrace.toml";
const DATABASE_FILE_NAME: &str = "echotrace.db";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    File,
    Sqlite,
}

impl FromStr for Backend {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(Backend::File),
            "sqlite" | "sql" | "db" => Ok(Backend::Sqlite),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: Option<PathBuf>,
    pub backend: Backend,
    pub database: Option<PathBuf>,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub model: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

fn echotrace_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".echotrace")
}

impl AppConfig {
    /// Reads `explicit` if given, otherwise `~/.echotrace/config.toml`, then
    /// `./echotrace.toml`; process environment overrides the file.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::discover()?,
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn discover() -> Result<Self, ConfigError> {
        for path in [
            echotrace_dir().join(CONFIG_FILE_NAME),
            PathBuf::from(LOCAL_CONFIG_FILE),
        ] {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Applies `ECHOTRACE_*` and `OPENAI_*` overrides looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = var("ECHOTRACE_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(backend) = var("ECHOTRACE_BACKEND") {
            self.backend = backend.parse().map_err(|_| ConfigError::InvalidValue {
                key: "ECHOTRACE_BACKEND",
                value: backend.clone(),
            })?;
        }
        if let Some(database) = var("ECHOTRACE_DATABASE") {
            self.database = Some(PathBuf::from(database));
        }
        if let Some(api_key) = var("OPENAI_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(api_base) = var("OPENAI_API_BASE") {
            self.api_base = Some(api_base);
        }
        if let Some(model) = var("ECHOTRACE_MODEL") {
            self.model = Some(model);
        }
        if let Some(timeout) = var("ECHOTRACE_REQUEST_TIMEOUT_SECS") {
            let secs = timeout
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "ECHOTRACE_REQUEST_TIMEOUT_SECS",
                    value: timeout.clone(),
                })?;
            self.request_timeout_secs = Some(secs);
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| echotrace_dir().join("conversations"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.data_dir().join(DATABASE_FILE_NAME))
    }

    pub fn api_base(&self) -> &str {
        self.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)
    }

    /// The configured model; unknown names are passed through with a warning.
    pub fn model(&self) -> &str {
        let model = self.model.as_deref().unwrap_or(DEFAULT_MODEL);
        if !AVAILABLE_MODELS.contains(&model) {
            warn!(model = %model, "Model is not in the list of known models");
        }
        model
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let config = AppConfig::default();
        assert_eq!(config.backend, Backend::File);
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert_eq!(config.api_base(), DEFAULT_API_BASE);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert!(config.data_dir().ends_with(".echotrace/conversations"));
        assert!(config.database_path().ends_with("conversations/echotrace.db"));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: AppConfig = toml::from_str(
            r#"
            data_dir = "/tmp/from-file"
            backend = "file"
            model = "gpt-4o"
            "#,
        )
        .unwrap();

        config
            .apply_env(env(&[
                ("ECHOTRACE_BACKEND", "sqlite"),
                ("ECHOTRACE_MODEL", "gpt-3.5-turbo"),
                ("ECHOTRACE_REQUEST_TIMEOUT_SECS", "5"),
                ("OPENAI_API_KEY", "sk-test"),
            ]))
            .unwrap();

        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.model(), "gpt-3.5-turbo");
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/from-file"));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/from-file/echotrace.db"));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[("ECHOTRACE_MODEL", "  "), ("OPENAI_API_KEY", "")]))
            .unwrap();
        assert!(config.model.is_none());
        assert!(config.api_key.is_none());
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        for (key, value) in [
            ("ECHOTRACE_BACKEND", "postgres"),
            ("ECHOTRACE_REQUEST_TIMEOUT_SECS", "soon"),
            ("ECHOTRACE_REQUEST_TIMEOUT_SECS", "0"),
        ] {
            let mut config = AppConfig::default();
            let err = config.apply_env(env(&[(key, value)])).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }), "{key}={value}");
        }
    }

    #[test]
    fn unknown_model_is_kept() {
        let config = AppConfig {
            model: Some("local-llama".into()),
            ..Default::default()
        };
        assert_eq!(config.model(), "local-llama");
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backend = 12").unwrap();

        let err = AppConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
