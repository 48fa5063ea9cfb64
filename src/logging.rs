//! Log subscriber setup.
//!
//! The crate itself only emits `tracing` events; this helper installs a
//! `tracing-subscriber` formatter for binaries that do not bring their own.

use tracing_subscriber::EnvFilter;

use crate::config::{Config, LogFormat};

/// Build the log filter: `RUST_LOG` if set, otherwise the configured level.
pub fn env_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Install the global log subscriber.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_logging(config: &Config) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_target(true)
        .with_thread_ids(true);

    match config.log_format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = Config::default();
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
