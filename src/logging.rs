//! Logging setup for the command-line tool.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary (or to whatever application embeds the crate).

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system.
///
/// With a `log_dir`, logs go to a daily rolling file there. Without one, on
/// Linux this will attempt to connect to systemd-journald; otherwise logs
/// go to stderr.
///
/// Log level can be controlled via the `IMGEVAL_LOG` environment variable:
/// - `IMGEVAL_LOG=debug` for per-image scores and timings
/// - `IMGEVAL_LOG=info` for model loading (default)
/// - `IMGEVAL_LOG=warn` for warnings and errors only
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    let env_filter = EnvFilter::try_from_env("IMGEVAL_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_dir) = log_dir {
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = tracing_appender::rolling::daily(&log_dir, "imgeval.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // The guard flushes on drop and must live until exit
        static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD.set(guard);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .try_init()?;

        tracing::info!("Logging initialized with file backend at {:?}", log_dir);
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(journald_layer.with_syslog_identifier("imgeval".to_string()))
                .try_init()?;

            tracing::debug!("Logging initialized with journald backend");
            return Ok(());
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    Ok(())
}
