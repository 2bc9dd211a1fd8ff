use crate::error::{AppError, ConfigError, Result};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    Layer, Registry,
};

#[derive(Debug)]
pub struct LoggerConfig {
    pub directory: String,
    pub file_name: String,
    pub rotation: Rotation,
    pub level: Level,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            file_name: "scraper.log".to_string(),
            rotation: Rotation::DAILY,
            level: Level::INFO,
        }
    }
}

impl LoggerConfig {
    pub fn from_config(config: &crate::config::LogConfig) -> Result<Self> {
        Ok(Self {
            directory: config.directory.clone(),
            file_name: config.filename.clone(),
            rotation: Rotation::DAILY,
            level: parse_log_level(&config.level)?,
        })
    }
}

pub fn init_logging(config: LoggerConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).map_err(|e| {
        AppError::Config(ConfigError::FileRead(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to create log directory: {}", e),
        )))
    })?;

    let file_appender =
        RollingFileAppender::new(config.rotation, config.directory, config.file_name);

    let file_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(file_appender)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_filter(tracing::level_filters::LevelFilter::from_level(
            config.level,
        ));

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(true)
        .with_filter(tracing::level_filters::LevelFilter::from_level(
            config.level,
        ));

    let subscriber = Registry::default().with(file_layer).with(stdout_layer);

    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        AppError::Config(ConfigError::InvalidValue(format!(
            "Failed to set global subscriber: {}",
            e
        )))
    })?;

    Ok(())
}

pub fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(AppError::Config(ConfigError::InvalidValue(format!(
            "Invalid log level: {}",
            level
        )))),
    }
}

/// Short tag for an `AppError`, used as the `kind` field in error logs.
pub fn error_kind(err: &AppError) -> &'static str {
    match err {
        AppError::Config(_) => "config",
        AppError::Client(_) => "client",
        AppError::Page(_) => "page",
        AppError::Scraper(_) => "scraper",
        AppError::Store(_) => "store",
        AppError::Generator(_) => "generator",
        AppError::Io(_) => "io",
        AppError::Request(_) => "request",
        AppError::Serde(_) => "serde",
        AppError::Csv(_) => "csv",
    }
}

// Helper macros for consistent logging with error handling
#[macro_export]
macro_rules! log_error {
    // Handle AppError values
    ($err:expr => $($arg:tt)*) => {{
        let err: &$crate::error::AppError = &$err;
        tracing::error!(error = %err, kind = $crate::logging::error_kind(err), $($arg)*)
    }};
    // Handle regular string messages
    ($($arg:tt)*) => {
        tracing::error!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        tracing::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        tracing::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!(parse_log_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("warn").unwrap(), Level::WARN);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn tags_error_kinds() {
        let err = AppError::Page(crate::error::PageError::Closed);
        assert_eq!(error_kind(&err), "page");
    }
}
