use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Env var that overrides the log directory (used by tests and the CLI).
pub const LOG_DIR_ENV: &str = "FARMSYNC_LOG_DIR";
/// Env var holding the tracing filter, e.g. `farmsync=debug`.
pub const LOG_FILTER_ENV: &str = "FARMSYNC_LOG";

const DEFAULT_FILTER: &str = "farmsync=info";

// The non-blocking file writer stops flushing once its guard drops, so the
// guard lives for the whole process.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Install the global tracing subscriber: pretty stdout plus a daily-rolling
/// JSON file sink. Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    let file_layer = open_file_writer().map(|writer| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
    });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        // Route `log` records from dependencies into tracing.
        let _ = tracing_log::LogTracer::init();
        tracing::debug!(target: "farmsync", event = "logging_initialized");
    }
}

fn open_file_writer() -> Option<tracing_appender::non_blocking::NonBlocking> {
    let dir = log_dir()?;
    if let Err(err) = std::fs::create_dir_all(&dir) {
        eprintln!("farmsync: cannot create log dir {}: {err}", dir.display());
        return None;
    }
    let appender = tracing_appender::rolling::daily(&dir, "farmsync.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    // A second init loses the race for the cell; its writer is discarded
    // together with the whole layer, which is fine.
    FILE_GUARD.set(guard).ok()?;
    Some(writer)
}

fn log_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(LOG_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    dirs::data_local_dir().map(|base| base.join("farmsync").join("logs"))
}
