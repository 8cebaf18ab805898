//! Retrieval pipeline configuration types.
//!
//! These types define the resolved (non-optional) settings used by
//! `notekeep-rag`. They are created from the user-facing
//! `RagToolsSettings` TOML struct via `From`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::settings::RagToolsSettings;
use crate::message::ModelFamily;

/// Resolved retrieval pipeline settings (all values filled with defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSettings {
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_embedding_concurrency")]
    pub embedding_concurrency: usize,
    #[serde(default = "default_chunk_target_words")]
    pub chunk_target_words: usize,
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default)]
    pub model_family: ModelFamily,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Override the embeddings database location. Primarily for testing.
    #[serde(default)]
    pub db_path_override: Option<PathBuf>,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            embedding_dim: default_embedding_dim(),
            embedding_concurrency: default_embedding_concurrency(),
            chunk_target_words: default_chunk_target_words(),
            retrieval_k: default_retrieval_k(),
            history_turns: default_history_turns(),
            model_family: ModelFamily::default(),
            system_prompt: default_system_prompt(),
            db_path_override: None,
        }
    }
}

fn default_embedding_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_embedding_model() -> String {
    "all-minilm:l12-v2".to_string()
}

fn default_embedding_dim() -> usize {
    384
}

fn default_embedding_concurrency() -> usize {
    1
}

fn default_chunk_target_words() -> usize {
    300
}

fn default_retrieval_k() -> usize {
    5
}

fn default_history_turns() -> usize {
    6
}

fn default_system_prompt() -> String {
    "You are a helpful assistant answering questions about the user's note. \
     Use only the material inside the context tags; say so when it does not contain the answer."
        .to_string()
}

impl From<&RagToolsSettings> for RagSettings {
    fn from(value: &RagToolsSettings) -> Self {
        let mut settings = RagSettings::default();
        if let Some(url) = &value.embedding_url {
            settings.embedding_url = url.clone();
        }
        if let Some(model) = &value.embedding_model {
            settings.embedding_model = model.clone();
        }
        if let Some(dim) = value.embedding_dim {
            settings.embedding_dim = dim;
        }
        if let Some(concurrency) = value.embedding_concurrency {
            settings.embedding_concurrency = concurrency.max(1);
        }
        if let Some(words) = value.chunk_target_words {
            settings.chunk_target_words = words;
        }
        if let Some(k) = value.retrieval_k {
            settings.retrieval_k = k;
        }
        if let Some(turns) = value.history_turns {
            settings.history_turns = turns;
        }
        if let Some(family) = value.model_family {
            settings.model_family = family;
        }
        if let Some(prompt) = &value.system_prompt {
            settings.system_prompt = prompt.clone();
        }
        if let Some(path) = &value.db_path {
            settings.db_path_override = Some(PathBuf::from(path));
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_defaults() {
        let tools = RagToolsSettings {
            embedding_dim: Some(768),
            embedding_concurrency: Some(0),
            retrieval_k: Some(2),
            model_family: Some(ModelFamily::Gemma),
            db_path: Some("/tmp/rag.sqlite3".to_string()),
            ..Default::default()
        };

        let resolved = RagSettings::from(&tools);
        assert_eq!(resolved.embedding_dim, 768);
        assert_eq!(resolved.embedding_concurrency, 1);
        assert_eq!(resolved.retrieval_k, 2);
        assert_eq!(resolved.chunk_target_words, 300);
        assert_eq!(resolved.model_family, ModelFamily::Gemma);
        assert_eq!(
            resolved.db_path_override,
            Some(PathBuf::from("/tmp/rag.sqlite3"))
        );
    }

    #[test]
    fn empty_overrides_keep_defaults() {
        let resolved = RagSettings::from(&RagToolsSettings::default());
        assert_eq!(resolved.embedding_dim, 384);
        assert_eq!(resolved.retrieval_k, 5);
        assert_eq!(resolved.history_turns, 6);
        assert_eq!(resolved.embedding_url, "http://127.0.0.1:11434");
    }
}
