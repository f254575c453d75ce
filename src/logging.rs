// Logging setup: console output plus an optional daily-rolling debug file

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "grid_bot.log";

/// Install the global subscriber. The console follows `RUST_LOG` when set,
/// else the configured level (`debug` with `verbose`). The returned guard
/// must stay alive for the file writer to flush.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Option<WorkerGuard> {
    let console_level = if verbose { "debug" } else { config.level.as_str() };
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn,reqwest=warn,tungstenite=warn", console_level)));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(console_filter);

    let (file_layer, guard) = if config.log_to_file {
        match file_writer(&config.directory) {
            Ok((writer, guard)) => {
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_filter(EnvFilter::new(format!(
                        "{},hyper=warn,reqwest=warn,tungstenite=warn",
                        config.file_level
                    )));
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    config.directory, e
                );
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    // A second init (tests, repeated CLI calls) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init();

    guard
}

fn file_writer(directory: &str) -> std::io::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(directory)?;

    // rolling::daily panics if it cannot open its first file
    let probe = Path::new(directory).join(".grid_bot_write_test");
    std::fs::OpenOptions::new().create(true).append(true).open(&probe)?;
    let _ = std::fs::remove_file(&probe);

    let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

/// Minimal logging for one-shot commands
pub fn init_logging_simple(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let _ = tracing_subscriber::fmt().with_max_level(level).with_target(false).try_init();
}
