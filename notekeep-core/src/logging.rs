//! Tracing subscriber bootstrap.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSettings;

/// Build the env filter: `RUST_LOG` wins, then the configured level.
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(settings: &LoggingSettings) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(settings))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
