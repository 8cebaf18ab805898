//! Configuration management for notekeep.
//!
//! Settings come from a TOML file:
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [rag]
//! embedding_model = "all-minilm:l12-v2"
//! embedding_dim = 384
//! chunk_target_words = 300
//! retrieval_k = 5
//! model_family = "chat_ml"
//! ```
//!
//! [`Settings`] mirrors the file (every retrieval knob optional) and
//! [`RagSettings`] is the resolved form the pipeline consumes.

pub mod rag;
mod settings;

pub use rag::RagSettings;
pub use settings::{LoggingSettings, RagToolsSettings, Settings, SettingsError};

impl Settings {
    /// Resolved retrieval settings with defaults applied.
    pub fn rag_settings(&self) -> RagSettings {
        RagSettings::from(&self.rag)
    }
}
