use crate::domain::settings::LogSettings;
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub struct LoggingGuard {
    // Dropping the guards stops the background writers, so keep them until exit
    _guards: Vec<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `settings.level`; `verbosity` (from `-v` flags) raises
/// the configured level by that many steps.
pub fn init_logger(settings: &LogSettings, verbosity: u8) -> anyhow::Result<LoggingGuard> {
    let mut guards = Vec::new();

    let level = raise_level(&settings.level, verbosity);
    let level_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Console layer
    let console_layer = if settings.console_logging_enabled {
        Some(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_file(settings.show_file_line)
                .with_line_number(settings.show_file_line)
                .with_thread_ids(settings.show_thread_ids)
                .with_thread_names(settings.show_thread_ids)
                .with_target(settings.show_target)
                .with_ansi(settings.ansi_colors),
        )
    } else {
        None
    };

    // File layer
    let file_layer = if settings.file_logging_enabled {
        let file_appender = tracing_appender::rolling::RollingFileAppender::new(
            rotation_from(&settings.rotation),
            &settings.log_dir,
            &settings.file_name_prefix,
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        guards.push(guard);
        Some(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_file(settings.show_file_line)
                .with_line_number(settings.show_file_line)
                .with_thread_ids(settings.show_thread_ids)
                .with_thread_names(settings.show_thread_ids)
                .with_target(settings.show_target),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(level_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::debug!("Logging initialized");

    Ok(LoggingGuard { _guards: guards })
}

fn rotation_from(name: &str) -> tracing_appender::rolling::Rotation {
    match name.to_lowercase().as_str() {
        "hourly" => tracing_appender::rolling::Rotation::HOURLY,
        "minutely" => tracing_appender::rolling::Rotation::MINUTELY,
        "never" => tracing_appender::rolling::Rotation::NEVER,
        _ => tracing_appender::rolling::Rotation::DAILY,
    }
}

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

fn raise_level(level: &str, verbosity: u8) -> String {
    if verbosity == 0 {
        return level.to_string();
    }
    match LEVELS.iter().position(|l| l.eq_ignore_ascii_case(level)) {
        Some(idx) => {
            let raised = (idx + verbosity as usize).min(LEVELS.len() - 1);
            LEVELS[raised].to_string()
        }
        // Directive strings like "plantar_link=debug" are left alone
        None => level.to_string(),
    }
}
