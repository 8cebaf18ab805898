//! Shared configuration, logging and prompt types for notekeep.

pub mod config;
pub mod logging;
pub mod message;

pub use config::{LoggingSettings, RagSettings, RagToolsSettings, Settings, SettingsError};
pub use message::{ModelFamily, PromptTurn, TurnRole};
