//! Logging setup for applications embedding service proxies
//!
//! The library itself only emits `tracing` events. Applications that don't
//! install their own subscriber can call [`init_logging`] or
//! [`init_logging_from_env`] once at startup.

use std::str::FromStr;

use tracing_subscriber::{fmt, EnvFilter, Registry};

const LOG_MODE_VAR: &str = "UPNP_PROXY_LOG_MODE";
const LOG_LEVEL_VAR: &str = "UPNP_PROXY_LOG_LEVEL";

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed
    Silent,
    /// Compact stderr output at `info`
    Development,
    /// Verbose output with source locations at `debug`
    Debug,
}

impl FromStr for LoggingMode {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" | "off" => Ok(LoggingMode::Silent),
            "development" | "dev" => Ok(LoggingMode::Development),
            "debug" => Ok(LoggingMode::Debug),
            other => Err(LoggingError::InvalidEnv(format!(
                "{LOG_MODE_VAR}={other} (expected silent, development or debug)"
            ))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid environment variable: {0}")]
    InvalidEnv(String),
}

/// Install a global subscriber for `mode`.
///
/// # Environment Variables
///
/// - `UPNP_PROXY_LOG_LEVEL`: filter directives, e.g. `service_proxy=trace`
/// - `RUST_LOG`: used when `UPNP_PROXY_LOG_LEVEL` is unset
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .pretty()
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Initialize logging from `UPNP_PROXY_LOG_MODE`.
///
/// An unset variable means [`LoggingMode::Silent`]; an unrecognized value is
/// an error.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = match std::env::var(LOG_MODE_VAR) {
        Ok(value) => value.parse()?,
        Err(_) => LoggingMode::Silent,
    };

    init_logging(mode)
}

fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let directives = std::env::var(LOG_LEVEL_VAR)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    EnvFilter::try_new(&directives)
        .map_err(|e| LoggingError::InvalidEnv(format!("{directives}: {e}")))
}

/// Whether a global subscriber has already been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("silent", LoggingMode::Silent)]
    #[case("OFF", LoggingMode::Silent)]
    #[case("development", LoggingMode::Development)]
    #[case(" dev ", LoggingMode::Development)]
    #[case("Debug", LoggingMode::Debug)]
    fn test_mode_parsing(#[case] raw: &str, #[case] mode: LoggingMode) {
        assert_eq!(raw.parse::<LoggingMode>().unwrap(), mode);
    }

    #[test]
    fn test_invalid_mode() {
        let err = "loud".parse::<LoggingMode>().unwrap_err();
        assert!(err.to_string().contains("UPNP_PROXY_LOG_MODE=loud"));
    }

    #[test]
    fn test_silent_mode_installs_nothing() {
        assert!(init_logging(LoggingMode::Silent).is_ok());
    }
}
