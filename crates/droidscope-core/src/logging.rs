//! Logging configuration using tracing
//!
//! Every run appends to a daily log file. Setting `DROIDSCOPE_LOG` also echoes
//! matching events to stderr, since command output owns stdout.

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable holding the tracing filter directive
pub const LOG_ENV_VAR: &str = "DROIDSCOPE_LOG";

/// File filter used when `DROIDSCOPE_LOG` is unset or invalid
const DEFAULT_FILE_FILTER: &str = "droidscope=info,warn";

const LOG_FILE_NAME: &str = "droidscope.log";

/// Initialize the logging subsystem and return the log file path
///
/// Logs are written to `~/.local/share/droidscope/logs/`.
/// `DROIDSCOPE_LOG` sets the filter for both the file and stderr; when it is
/// unset nothing is printed to stderr.
///
/// # Examples
/// ```bash
/// DROIDSCOPE_LOG=debug droidscope dump
/// DROIDSCOPE_LOG=droidscope_device=trace droidscope info
/// ```
pub fn init() -> Result<PathBuf> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let directive = std::env::var(LOG_ENV_VAR).ok();
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);

    let file_filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILE_FILTER));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_timer(fmt::time::ChronoLocal::new(
            "%Y-%m-%d %H:%M:%S%.3f".to_string(),
        ))
        .with_filter(file_filter);

    let stderr_layer = stderr_filter(directive.as_deref()).map(|filter| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .compact()
            .with_filter(filter)
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();

    let log_file = get_current_log_file()?;
    tracing::info!("droidscope starting, log file: {}", log_file.display());

    Ok(log_file)
}

/// Filter for the stderr layer, present only when a directive was given
fn stderr_filter(directive: Option<&str>) -> Option<EnvFilter> {
    directive
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(EnvFilter::new)
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("droidscope").join("logs"))
}

/// Get the log file path for the current day
pub fn get_current_log_file() -> Result<PathBuf> {
    let dir = get_log_directory()?;
    Ok(dir.join(LOG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_lives_under_droidscope_logs() {
        let path = get_current_log_file().unwrap();
        assert!(path.ends_with("droidscope/logs/droidscope.log"));
    }

    #[test]
    fn test_stderr_layer_only_with_directive() {
        assert!(stderr_filter(None).is_none());
        assert!(stderr_filter(Some("")).is_none());
        assert!(stderr_filter(Some("   ")).is_none());

        let filter = stderr_filter(Some("droidscope_device=trace")).unwrap();
        assert!(filter.to_string().contains("droidscope_device=trace"));
    }
}
