//! Settings configuration loaded from TOML files.
//!
//! Non-sensitive configuration stored in the XDG config directory
//! (`~/.config/notekeep/config.toml`). Every retrieval knob is optional here;
//! [`super::RagSettings`] fills in the defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::message::ModelFamily;

/// Default TOML configuration file content
const DEFAULT_CONFIG_TOML: &str = r#"# notekeep configuration file
# Located at: ~/.config/notekeep/config.toml

[logging]
level = "info"

[rag]
embedding_url = "http://127.0.0.1:11434"
embedding_model = "all-minilm:l12-v2"
embedding_dim = 384
embedding_concurrency = 1
chunk_target_words = 300
retrieval_k = 5
history_turns = 6
model_family = "chat_ml"
# system_prompt = "You answer questions about the user's note."
# db_path = "/path/to/embeddings.sqlite3"
"#;

/// Settings loaded from TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Retrieval pipeline overrides
    #[serde(default)]
    pub rag: RagToolsSettings,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// User-facing retrieval settings. Unset values fall back to the defaults in
/// [`super::RagSettings`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RagToolsSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_dim: Option<usize>,
    /// Maximum number of embedding calls in flight against the shared model handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_target_words: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_k: Option<usize>,
    /// Number of past question/answer exchanges rendered into a chat prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_turns: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_family: Option<ModelFamily>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,
}

impl Settings {
    /// Load settings from the TOML configuration file.
    ///
    /// If the config file doesn't exist, creates it with default values.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Creating default configuration at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Serialize settings to TOML content.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the configuration file path.
    ///
    /// `$NOTEKEEP_CONFIG_DIR/config.toml` when set, otherwise
    /// `~/.config/notekeep/config.toml`.
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var("NOTEKEEP_CONFIG_DIR") {
            let dir = PathBuf::from(override_dir);
            return Ok(dir.join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("notekeep");

        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG_TOML)?;
        Ok(())
    }

    /// Save settings to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;
        fs::write(path, content)?;
        Ok(())
    }
}
