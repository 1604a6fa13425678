use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use arg_core::ArgError;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, registry};

use crate::config::LoggingConfig;

/// Maps a 0-3 verbosity onto a level filter.
pub fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Scoped logging service for one sampler run.
///
/// Events go to stderr (unless quiet) and to the run's log file. The
/// subscriber is installed for the current thread only and is removed, and
/// the log file closed, when the context is dropped.
pub struct LogContext {
    path: Option<PathBuf>,
    _guard: DefaultGuard,
}

impl LogContext {
    /// Opens `log_path` (appending when `append` is set) and installs the
    /// subscriber.
    pub fn open(
        log_path: Option<&Path>,
        config: &LoggingConfig,
        append: bool,
    ) -> Result<Self, ArgError> {
        let file = match log_path {
            Some(path) => Some(open_log(path, append)?),
            None => None,
        };
        let stderr_layer = (!config.quiet).then(|| {
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
        });
        let file_layer = file.map(|file| {
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        });
        let subscriber = registry()
            .with(level_for(config.verbose))
            .with(stderr_layer)
            .with(file_layer);
        let guard = tracing::subscriber::set_default(subscriber);
        Ok(Self {
            path: log_path.map(Path::to_path_buf),
            _guard: guard,
        })
    }

    /// Log file written by this context.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn open_log(path: &Path, append: bool) -> Result<File, ArgError> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options
        .open(path)
        .map_err(|err| ArgError::io("log-open", err, path))
}
