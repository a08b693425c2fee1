use std::{
    fs::{self, File},
    io,
    path::PathBuf,
};

use tracing_subscriber::{
    Layer, Registry,
    fmt::{self},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::{LoggerConfig, LoggerFormat};

#[derive(Debug, thiserror::Error)]
pub enum InitLoggerError {
    #[error("Failed to prepare log file {path:?}.")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Global logger is already set.")]
    AlreadyInitialized(#[from] TryInitError),
}

pub fn init_logger(opts: LoggerConfig) -> Result<(), InitLoggerError> {
    let stdio_filter = tracing_subscriber::EnvFilter::new(opts.stdio_level.clone());
    let stdio_layer = match opts.format {
        LoggerFormat::Pretty => fmt::Layer::default().pretty().boxed(),
        LoggerFormat::Json => fmt::Layer::default().json().boxed(),
        LoggerFormat::Compact => fmt::Layer::default().compact().boxed(),
    }
    .with_filter(stdio_filter);

    let file_layer = match opts.log_file {
        Some(log_file) => {
            let writer = create_log_file(&log_file).map_err(|source| InitLoggerError::LogFile {
                path: log_file.clone(),
                source,
            })?;
            let filter = tracing_subscriber::EnvFilter::new(opts.file_level.clone());
            Some(
                fmt::Layer::default()
                    .json()
                    .with_writer(writer)
                    .with_filter(filter),
            )
        }
        None => None,
    };

    match file_layer {
        Some(file_layer) => Registry::default()
            .with(stdio_layer)
            .with(file_layer)
            .try_init()?,
        None => Registry::default().with(stdio_layer).try_init()?,
    }
    Ok(())
}

/// Truncates previous logs.
fn create_log_file(log_file: &PathBuf) -> io::Result<File> {
    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(log_file)
}
