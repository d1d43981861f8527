//! Configuration loading, validation, and management for chatmesh.
//!
//! Two layers:
//! - [`AppConfig`], process-wide, loaded from `~/.chatmesh/config.toml` with
//!   environment variable overrides.
//! - [`ChatbotConfig`], per turn, deserialized from the caller's JSON.

pub mod chatbot;
pub mod model;
pub mod prompts;

pub use chatbot::{
    AgentConfig, AgentToolSpec, ChatbotConfig, ChatbotMode, DocumentRetrieverConfig, EndpointToolConfig,
    IndexConfig, IndexType, IntentionConfig, IntentionRetrieverConfig, Lang, LlmConfig, PrivateKnowledgeConfig,
    QqMatchConfig, QueryProcessConfig, QuestionRetrieverConfig,
};
pub use chatmesh_core::timeout::TimeoutConfig;
pub use model::{ModelConfig, ModelKwargs, ModelTable};
pub use prompts::Prompts;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.chatmesh/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion/embedding endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model used when a chatbot config leaves `model_id` empty
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Embedding model used when an index config leaves it empty
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Search service connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Default per-call timeouts (a chatbot config may override them)
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Extra or overriding entries for the model table
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("embedding_model", &self.embedding_model)
            .field("store", &self.store)
            .field("timeouts", &self.timeouts)
            .field("models", &self.models)
            .finish()
    }
}

/// Search service connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the OpenSearch-compatible endpoint
    #[serde(default = "default_store_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_store_url() -> String {
    "http://localhost:9200".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            username: None,
            password: None,
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.chatmesh/config.toml).
    ///
    /// Environment overrides:
    /// - `CHATMESH_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `CHATMESH_STORE_URL`
    /// - `CHATMESH_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("CHATMESH_API_KEY").or_else(|| {
            if self.api_key.is_none() {
                var("OPENAI_API_KEY")
            } else {
                None
            }
        }) {
            self.api_key = Some(key);
        }

        if let Some(url) = var("CHATMESH_STORE_URL") {
            self.store.url = url;
        }

        if let Some(model) = var("CHATMESH_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chatmesh")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("api_url must not be empty".into()));
        }
        if self.store.url.trim().is_empty() {
            return Err(ConfigError::ValidationError("store.url must not be empty".into()));
        }
        if self.timeouts.store_ms == 0 || self.timeouts.completion_ms == 0 {
            return Err(ConfigError::ValidationError("timeouts must be > 0".into()));
        }
        for model in &self.models {
            if model.model_id.trim().is_empty() {
                return Err(ConfigError::ValidationError("models[].model_id must not be empty".into()));
            }
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The built-in model table with this config's `[[models]]` applied.
    pub fn model_table(&self) -> ModelTable {
        let mut table = ModelTable::builtin();
        for model in &self.models {
            table.insert(model.clone());
        }
        table
    }

    /// Generate a default config TOML string (for `check-config --init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            embedding_model: default_embedding_model(),
            store: StoreConfig::default(),
            timeouts: TimeoutConfig::default(),
            models: Vec::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Failed to parse chatbot config: {0}")]
    ChatbotParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for chatmesh_core::Error {
    fn from(err: ConfigError) -> Self {
        chatmesh_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.url, "http://localhost:9200");
        assert!(!config.has_api_key());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.timeouts.store_ms, config.timeouts.store_ms);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_model, "gpt-4o-mini");
    }

    #[test]
    fn loads_file_with_models_and_store() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
default_model = "anthropic.claude-3-sonnet-20240229-v1:0"

[store]
url = "https://search.internal:443"
username = "admin"
password = "hunter2"

[timeouts]
store_ms = 2500

[[models]]
model_id = "my-finetune"
enable_any_tool_choice = false
[models.default_model_kwargs]
max_tokens = 512
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.store.url, "https://search.internal:443");
        assert_eq!(config.timeouts.store_ms, 2500);
        assert_eq!(config.timeouts.completion_ms, TimeoutConfig::default().completion_ms);

        let table = config.model_table();
        let m = table.resolve("my-finetune");
        assert!(!m.enable_any_tool_choice);
        assert_eq!(m.default_model_kwargs.max_tokens, Some(512));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "store = 42").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply_in_priority_order() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-openai"),
            ("CHATMESH_STORE_URL", "http://other:9200"),
            ("CHATMESH_MODEL", "gpt-4o"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.store.url, "http://other:9200");
        assert_eq!(config.default_model, "gpt-4o");

        let mut config = AppConfig::default();
        config.apply_env(|k| match k {
            "CHATMESH_API_KEY" => Some("sk-chatmesh".into()),
            "OPENAI_API_KEY" => Some("sk-openai".into()),
            _ => None,
        });
        assert_eq!(config.api_key.as_deref(), Some("sk-chatmesh"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            store: StoreConfig {
                password: Some("hunter2".into()),
                ..StoreConfig::default()
            },
            ..AppConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("localhost:9200"));
    }
}
