use std::path::PathBuf;

use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Source of "now" for every timestamp the service writes.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        now_utc()
    }
}

/// A clock stuck at one instant, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Clamp pagination parameters the same way everywhere.
pub fn page_window(skip: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let skip = skip.unwrap_or(0).max(0);
    let limit = limit.unwrap_or(100).clamp(1, 100);
    (skip, limit)
}

/// Stdout by default, or a daily-rotated file under `log`.
pub fn init_log(
    log: Option<PathBuf>,
    level: &str,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let subscriber_builder = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_thread_names(true);
    let (non_blocking, guard, ansi) = if let Some(log) = log {
        // daily rotated file
        if !log.is_dir() {
            anyhow::bail!("log path {} is not a directory", log.display());
        }
        let file_appender = tracing_appender::rolling::daily(log, "book_club.log");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        (writer, guard, false)
    } else {
                let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
        (writer, guard, true)
    };
    tracing::subscriber::set_global_default(
        subscriber_builder
            .with_ansi(ansi)
            .with_writer(non_blocking)
            .finish(),
    )?;
    Ok(guard)
}
