use std::{
    cmp::Reverse,
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::Context;
use itertools::Itertools;
use time::OffsetDateTime;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Number of log files kept in the default log folder.
const MAX_LOG_FILES: usize = 20;

pub struct FileLoggerGuard<'a> {
    _append_guard: WorkerGuard,
    log_path: &'a Path,
}

impl<'a> FileLoggerGuard<'a> {
    fn new(_append_guard: WorkerGuard, log_path: &'a Path) -> Self {
        // Log after initializing the logger, so we can see the log path.
        tracing::info!("Writing log to {:?}", log_path);

        Self {
            _append_guard,
            log_path,
        }
    }
}

impl Drop for FileLoggerGuard<'_> {
    fn drop(&mut self) {
        tracing::info!("Wrote log to {:?}", self.log_path);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "UPPER")]
pub enum LevelFilter {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LevelFilter {
    fn into_tracing(self) -> tracing::level_filters::LevelFilter {
        match self {
            Self::Off => tracing::level_filters::LevelFilter::OFF,
            Self::Error => tracing::level_filters::LevelFilter::ERROR,
            Self::Warn => tracing::level_filters::LevelFilter::WARN,
            Self::Info => tracing::level_filters::LevelFilter::INFO,
            Self::Debug => tracing::level_filters::LevelFilter::DEBUG,
            Self::Trace => tracing::level_filters::LevelFilter::TRACE,
        }
    }
}

/// Configures tracing and sets up the logging facility.
///
/// # Arguments
///
/// * `log_path` - The path to the log file. If `None`, log messages will not be stored in a file.
/// * `default` - The default log level to use. If `None`, falls back to `RUST_LOG` in the environment.
pub fn setup_logging(
    log_path: Option<&Path>,
    default: Option<LevelFilter>,
) -> anyhow::Result<Option<FileLoggerGuard<'_>>> {
    let stderr_subscriber = tracing_subscriber::fmt::layer()
        .compact()
        .without_time()
        .with_writer(std::io::stderr)
        .with_filter(match default {
            Some(filter) => {
                // We have a default (from the command line), ignore RUST_LOG.
                EnvFilter::builder()
                    .with_default_directive(filter.into_tracing().into())
                    .parse_lossy("")
            }
            None => {
                // No default, use RUST_LOG or fall back to WARN.
                EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::WARN.into())
                    .from_env_lossy()
            }
        });

    let Some(log_path) = log_path else {
        tracing_subscriber::registry()
            .with(stderr_subscriber)
            .init();

        return Ok(None);
    };

    let log_file = File::create(log_path)
        .with_context(|| format!("Failed to create log file {log_path:?}"))?;

    let (file_appender, guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .lossy(false)
        .buffered_lines_limit(128 * 1024)
        .finish(log_file);

    let file_subscriber = tracing_subscriber::fmt::layer()
        .json()
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::FULL)
        .with_writer(file_appender);

    tracing_subscriber::registry()
        .with(stderr_subscriber)
        .with(file_subscriber)
        .init();

    Ok(Some(FileLoggerGuard::new(guard, log_path)))
}

/// A fresh log file path in the application data directory.
pub fn default_logfile_location() -> anyhow::Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("co", "go-next", "hdzero-programmer")
        .context("the application storage directory could not be determined")?;
    let directory = project_dirs.data_dir();
    fs::create_dir_all(directory).context(format!("{directory:?} could not be created"))?;

    Ok(directory.join(logfile_name(OffsetDateTime::now_utc())))
}

fn logfile_name(now: OffsetDateTime) -> String {
    sanitize_filename::sanitize_with_options(
        format!("{}.log", now.unix_timestamp_nanos() / 1_000_000),
        sanitize_filename::Options {
            replacement: "_",
            ..Default::default()
        },
    )
}

/// Deletes all but the [`MAX_LOG_FILES`] most recent `.log` files in `directory`.
pub fn prune_logs(directory: &Path) -> anyhow::Result<()> {
    // Get the path and modification time of all files in the log directory that have the '.log'
    // suffix.
    let mut log_files = fs::read_dir(directory)?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "log") {
                let last_modified = entry.metadata().ok()?.modified().ok()?;
                Some((path, last_modified))
            } else {
                None
            }
        })
        .collect_vec();

    // Newest first.
    log_files.sort_unstable_by_key(|(_, modified)| Reverse(*modified));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        fs::remove_file(path)?;
    }
    Ok(())
}
