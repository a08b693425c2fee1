use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use reencode_core::EngineOptions;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub transcoder: TranscoderOptions,
    pub logger: LoggerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscoderOptions {
    /// Number of sessions that run at the same time. Further sessions queue.
    pub worker_count: usize,
    pub engine: EngineOptions,
}

impl Default for TranscoderOptions {
    fn default() -> Self {
        Self {
            worker_count: 3,
            engine: EngineOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    pub stdio_level: String,
    pub file_level: String,
    pub format: LoggerFormat,
    pub log_file: Option<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            stdio_level: "info".to_string(),
            file_level: "debug".to_string(),
            format: LoggerFormat::Json,
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerFormat {
    Pretty,
    Json,
    Compact,
}

impl FromStr for LoggerFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(LoggerFormat::Json),
            "pretty" => Ok(LoggerFormat::Pretty),
            "compact" => Ok(LoggerFormat::Compact),
            _ => Err("invalid logger format"),
        }
    }
}

pub fn read_config() -> Config {
    read_config_from(|key| env::var(key).ok())
}

/// Same as [`read_config`] but with variables resolved by `lookup`.
pub fn read_config_from(lookup: impl Fn(&str) -> Option<String>) -> Config {
    let defaults = TranscoderOptions::default();
    let worker_count = parse_var(&lookup, "REENCODE_WORKER_COUNT", defaults.worker_count, |v| {
        *v > 0
    });
    let backoff_ms = parse_var(
        &lookup,
        "REENCODE_BACKOFF_MS",
        defaults.engine.backoff.as_millis() as u64,
        |_| true,
    );
    let progress_interval = parse_var(
        &lookup,
        "REENCODE_PROGRESS_INTERVAL",
        defaults.engine.progress_interval,
        |v| *v > 0,
    );
    let pass_through_buffer_size = parse_var(
        &lookup,
        "REENCODE_PASS_THROUGH_BUFFER_SIZE",
        defaults.engine.pass_through_buffer_size,
        |v| *v > 0,
    );

    let logger_defaults = LoggerConfig::default();
    let stdio_level = lookup("REENCODE_LOGGER_LEVEL").unwrap_or(logger_defaults.stdio_level);
    let format = parse_var(
        &lookup,
        "REENCODE_LOGGER_FORMAT",
        logger_defaults.format,
        |_| true,
    );
    let log_file = lookup("REENCODE_LOG_FILE")
        .filter(|path| !path.is_empty())
        .map(PathBuf::from);

    Config {
        transcoder: TranscoderOptions {
            worker_count,
            engine: EngineOptions {
                backoff: Duration::from_millis(backoff_ms),
                progress_interval,
                pass_through_buffer_size,
                ..defaults.engine
            },
        },
        logger: LoggerConfig {
            stdio_level,
            file_level: logger_defaults.file_level,
            format,
            log_file,
        },
    }
}

fn parse_var<T, E>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    is_valid: impl Fn(&T) -> bool,
) -> T
where
    T: FromStr<Err = E> + Display,
    E: Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if is_valid(&value) => value,
        Ok(value) => {
            warn!(key, %value, %default, "Value out of range, using default.");
            default
        }
        Err(err) => {
            warn!(key, %raw, %err, %default, "Invalid value, using default.");
            default
        }
    }
}

impl Display for LoggerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoggerFormat::Pretty => "pretty",
            LoggerFormat::Json => "json",
            LoggerFormat::Compact => "compact",
        };
        f.write_str(name)
    }
}
