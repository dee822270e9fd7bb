//! # Structured Logging
//!
//! Environment-aware console logging using the tracing ecosystem. Logs go to
//! stdout; containers and process supervisors collect them from there.
//!
//! - Level: `LOG_LEVEL`, then `RUST_LOG`, then a default for the environment
//!   (`debug` everywhere except `production`, which gets `info`)
//! - Environment: `RESILIENCE_ENV`, then `APP_ENV`, default `development`
//! - Format: human-readable, or JSON lines when `RESILIENCE_LOG_FORMAT=json`
//!
//! The crate itself only emits `tracing` events. Installing a subscriber is
//! the embedding application's choice; this is the stock one.

use crate::config::ConfigLoader;
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Output format of the console layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("RESILIENCE_LOG_FORMAT") {
            Ok(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber once. Safe to call repeatedly; an already
/// installed global subscriber (e.g. from a test harness) is kept.
pub fn init_structured_logging() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = ConfigLoader::detect_environment();
        let log_level = get_log_level(&environment);
        let format = LogFormat::from_env();
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let installed = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_filter(EnvFilter::new(&log_level)),
                )
                .try_init()
                .is_ok(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_ansi(use_ansi)
                        .with_filter(EnvFilter::new(&log_level)),
                )
                .try_init()
                .is_ok(),
        };

        if installed {
            tracing::info!(
                environment = %environment,
                log_level = %log_level,
                format = ?format,
                ansi_colors = use_ansi,
                "🔧 Structured logging initialized"
            );
        } else {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }
    });
}

/// Log level from `LOG_LEVEL`, `RUST_LOG`, or the environment default
fn get_log_level(environment: &str) -> String {
    std::env::var("LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map(|level| level.to_lowercase())
        .unwrap_or_else(|_| default_log_level(environment).to_string())
}

fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level_mapping() {
        assert_eq!(default_log_level("test"), "debug");
        assert_eq!(default_log_level("development"), "debug");
        assert_eq!(default_log_level("production"), "info");
        assert_eq!(default_log_level("staging"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        tracing::info!(component = "logging_test", "still logging");
    }
}
