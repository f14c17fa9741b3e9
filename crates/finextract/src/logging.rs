//! Process-wide tracing setup for the binary and embedding services.

use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingConfig;

static INITIALIZED: OnceLock<bool> = OnceLock::new();

/// Installs the global subscriber and bridges `log` records into it.
///
/// `RUST_LOG` takes precedence over the configured level. Only the first
/// call has an effect; the return value says whether a subscriber from this
/// crate is active.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    *INITIALIZED.get_or_init(|| install(config))
}

fn install(config: &LoggingConfig) -> bool {
    let filter = env_filter(&config.level);
    let registry = Registry::default().with(filter);

    let installed = if config.json {
        tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        )
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(true)))
    };

    // Another subscriber owns the process.
    if installed.is_err() {
        return false;
    }

    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::warn!("log bridge not installed: {}", e);
    }
    true
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
