//! # Structured Logging Module
//!
//! Console plus JSON-file tracing output for the migration binary. The
//! operator-facing run log lives in [`crate::run_log`]; this module covers
//! the diagnostic stream (API calls, batch progress).

use chrono::Utc;
use std::path::Path;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging once; later calls are no-ops
pub fn init_structured_logging(environment: &str, level: &str, log_dir: &Path) {
    LOGGER_GUARD.get_or_init(|| {
        let filter_directive = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());

        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!("Failed to create log directory {}: {e}", log_dir.display());
            return None;
        }

        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");
        let file_appender = tracing_appender::rolling::never(log_dir, &log_filename);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_filter(EnvFilter::new(filter_directive.clone())),
            )
            .with(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(filter_directive)),
            );

        // Tests and embedding callers may already have installed a subscriber
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_dir.join(&log_filename).display(),
            "Structured logging initialized"
        );

        Some(guard)
    });
}

/// Log level used when the configuration leaves it empty
pub fn default_level_for(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(default_level_for("test"), "debug");
        assert_eq!(default_level_for("development"), "debug");
        assert_eq!(default_level_for("production"), "info");
    }
}
