//! Logging configuration and initialization
//!
//! Compact console output by default, JSON on request, and an optional log
//! file written through a non-blocking appender.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::Layered, prelude::*, Layer, Registry};

type ConsoleLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Filter variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "CAN_STACKER_LOG";
/// Set to `json` for JSON output.
pub const LOG_FORMAT_ENV: &str = "CAN_STACKER_LOG_FORMAT";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Also write to `file_path` (default: None)
    pub file_path: Option<PathBuf>,
    /// Use JSON format for console logs (default: false)
    pub json_format: bool,
    /// Default log level filter (default: "info")
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_path: None,
            json_format: false,
            default_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// JSON when `CAN_STACKER_LOG_FORMAT=json`, else the configured format.
    pub fn use_json(&self) -> bool {
        std::env::var(LOG_FORMAT_ENV)
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(self.json_format)
    }
}

/// Initialize the global subscriber.
///
/// The returned guard flushes the log file on drop; keep it alive for the
/// life of the program.
///
/// # Environment Variables
///
/// - `CAN_STACKER_LOG`: filter (e.g. "debug", "info,can_stacker::arm=debug")
/// - `CAN_STACKER_LOG_FORMAT`: "json" for JSON output
pub fn init_logging(
    config: &LogConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));
    let use_json = config.use_json();

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let mut file_guard = None;

    let console_layer: Option<ConsoleLayer> = config.console_enabled.then(|| {
        if use_json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .compact()
                .boxed()
        }
    });

    if let Some(path) = &config.file_path {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        subscriber.with(console_layer).with(file_layer).try_init()?;
    } else {
        subscriber.with(console_layer).try_init()?;
    }

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        log_file = ?config.file_path,
        "logging initialized"
    );

    Ok(file_guard)
}

pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert!(config.console_enabled);
        assert!(config.file_path.is_none());
        assert!(!config.json_format);
        assert_eq!(config.default_level, "info");
    }
}
