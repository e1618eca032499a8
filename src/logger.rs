use anyhow::{Result, anyhow};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for &'static str {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(anyhow!("unknown log level: {}", other)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Directory for rolling log files
    pub log_dir: String,
    pub file_prefix: String,
    pub console_output: bool,
    /// Emit JSON lines to the log file instead of plain text
    pub json_format: bool,
    /// "daily" or "hourly"
    pub rotation: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_dir: "logs".to_string(),
            file_prefix: "api-dashboard".to_string(),
            console_output: true,
            json_format: false,
            rotation: "daily".to_string(),
        }
    }
}

impl LogConfig {
    /// Default filter directive: this crate plus HTTP request spans at the configured level.
    pub fn filter_directive(&self) -> String {
        let level = <&str>::from(self.level);
        format!("{}={},tower_http={}", env!("CARGO_CRATE_NAME"), level, level)
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
///
/// The returned guard flushes the file writer on drop and must be held for the
/// lifetime of the process.
pub fn init_logger(config: LogConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = match config.rotation.as_str() {
        "hourly" => rolling::hourly(&config.log_dir, &config.file_prefix),
        _ => rolling::daily(&config.log_dir, &config.file_prefix),
    };
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let file_layer = if config.json_format {
        fmt::layer()
            .json()
            .with_writer(non_blocking_file)
            .with_timer(ChronoUtc::rfc_3339())
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking_file)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;

    Ok(guard)
}

/// Development preset: debug level, console on, plain text files.
pub fn dev_log_config() -> LogConfig {
    LogConfig {
        level: LogLevel::Debug,
        file_prefix: "dev".to_string(),
        ..LogConfig::default()
    }
}

/// Production preset: info level, JSON files, no console.
pub fn prod_log_config() -> LogConfig {
    LogConfig {
        level: LogLevel::Info,
        log_dir: "/var/log/api-dashboard".to_string(),
        console_output: false,
        json_format: true,
        ..LogConfig::default()
    }
}
