//! Logging setup from [`LoggingConfig`] (§6): level, console/JSON format
//! and an optional file sink. The guard returned must be held for the
//! process lifetime or the non-blocking file writer drops buffered lines.

use mrcis_core::config::{LogFormat, LogLevel, LoggingConfig};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_new(level_str(config.level)).unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.file {
        Some(path) => {
            let directory = std::path::Path::new(path).parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = std::path::Path::new(path).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "mrcis.log".to_string());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let builder = fmt().with_env_filter(filter).with_writer(non_blocking).with_ansi(false);
            match config.format {
                LogFormat::Json => builder.json().init(),
                LogFormat::Console => builder.init(),
            }
            Some(guard)
        }
        None => {
            let builder = fmt().with_env_filter(filter);
            match config.format {
                LogFormat::Json => builder.json().init(),
                LogFormat::Console => builder.init(),
            }
            None
        }
    }
}

fn level_str(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warning => "warn",
        LogLevel::Error => "error",
    }
}
