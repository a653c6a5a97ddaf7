use crate::config::LoggingConfig;
use crate::transport::Rank;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging for one process of the group
///
/// - stderr, since stdout is left to whoever launched the job
/// - a daily rotating `rank-<n>.log` under `log_dir` when one is configured
/// - `RUST_LOG` overrides the configured level
pub fn init_logging(config: &LoggingConfig, rank: Rank) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = match &config.log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            let file_appender =
                RollingFileAppender::new(Rotation::DAILY, log_dir, log_file_name(rank));
            Some(
                fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false) // No colors in log files
                    .with_target(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_line_number(false),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::debug!(
        rank,
        level = %config.level,
        log_dir = ?config.log_dir,
        "Logging initialized"
    );

    Ok(())
}

/// Per-rank log file name, so ranks sharing a directory do not interleave
pub fn log_file_name(rank: Rank) -> String {
    format!("rank-{}.log", rank)
}
