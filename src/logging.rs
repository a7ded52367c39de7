//! Tracing subscriber setup
//!
//! `RUST_LOG` takes precedence over the configured level. The `json` format
//! emits one JSON object per event; anything else uses the human-readable
//! formatter.

use crate::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter directive for this crate at the configured level
pub fn filter_directive(config: &LoggingConfig) -> String {
    format!("minutely={}", config.level)
}

/// Install the global subscriber
///
/// Returns an error if a global subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    }
}
