//! # Local Logger
//!
//! Installs the process-wide `tracing` subscriber: a console layer and a plain
//! text file layer written through a non-blocking `tracing-appender` writer.
//! The file sink is the persistent, system-side record of every error the
//! service reports; the console mirrors it for operators.

use std::path::{Path, PathBuf};

use glob::glob;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::utils::misc::utils::file_timestamp;

/// Errors raised while installing the logging pipeline.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The log directory could not be created.
    #[error("Error creating log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The level string is not a valid `EnvFilter` directive.
    #[error("Invalid log level '{0}': {1}")]
    InvalidLevel(String, String),

    /// A global subscriber was already installed.
    #[error("Failed to install the global tracing subscriber: {0}")]
    Init(String),
}

/// # Logger Local Options
///
/// Controls where and how log lines are written.
#[derive(Debug, Clone)]
pub struct LoggerLocalOptions {
    /// Mirror log lines to the TTY (stdout).
    pub use_tty: bool,
    /// Append log lines to a timestamped file in `log_dir`.
    pub use_file: bool,
    /// Directory for log files. If `None`, defaults to `./logs`.
    pub log_dir: Option<PathBuf>,
    /// Default filter directive (`info`, `debug`, `server_enc=trace`, ...).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
}

impl Default for LoggerLocalOptions {
    fn default() -> Self {
        Self {
            use_tty: true,
            use_file: true,
            log_dir: None,
            level: "info".to_string(),
        }
    }
}

/// Keeps the non-blocking file writer alive. Dropping it flushes buffered lines,
/// so hold it for the lifetime of `main`.
pub struct LoggerGuard {
    _file_guard: Option<WorkerGuard>,
    log_file: Option<PathBuf>,
}

impl LoggerGuard {
    /// Path of the active log file, if file logging is enabled.
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

pub struct LoggerLocal {
    /// The name of the application associated with this logger instance.
    app_name: String,
    /// Configuration options determining logging behavior.
    options: LoggerLocalOptions,
    /// The path to the log file this instance will write, if file logging is enabled.
    current_log_file: Option<PathBuf>,
}

impl LoggerLocal {
    /// Rotates log files for a given application and log directory.
    ///
    /// Keeps only the most recent log file (by the timestamp in its filename) and
    /// deletes older ones. Returns the number of files removed.
    pub fn rotate_logs(app_name: &str, log_dir: &Path) -> usize {
        let pattern = format!("{}/{}-*.log", log_dir.display(), app_name);
        let mut log_files: Vec<PathBuf> = match glob(&pattern) {
            Ok(paths) => paths.filter_map(Result::ok).collect(),
            Err(e) => {
                eprintln!("Invalid glob pattern for log rotation {}: {}", pattern, e);
                return 0;
            }
        };

        // Newest first.
        log_files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

        let mut removed = 0;
        for old_file in log_files.iter().skip(1) {
            match std::fs::remove_file(old_file) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Error deleting old log file {}: {}", old_file.display(), e),
            }
        }
        removed
    }

    /// Creates a new `LoggerLocal`.
    ///
    /// When file logging is enabled this ensures the log directory exists,
    /// rotates old logs and picks the path of the new log file. Nothing is
    /// installed until [`LoggerLocal::init`] is called.
    pub fn new(app_name: impl Into<String>, options: Option<LoggerLocalOptions>) -> Result<Self, LoggerError> {
        let app_name = app_name.into();
        let options = options.unwrap_or_default();

        let mut logger = Self {
            app_name,
            options,
            current_log_file: None,
        };

        if logger.options.use_file {
            let log_base_dir = logger
                .options
                .log_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("./logs"));

            std::fs::create_dir_all(&log_base_dir).map_err(|source| LoggerError::LogDir {
                path: log_base_dir.clone(),
                source,
            })?;

            LoggerLocal::rotate_logs(&logger.app_name, &log_base_dir);

            let current_log_filename = format!("{}-{}.log", logger.app_name, file_timestamp());
            logger.current_log_file = Some(log_base_dir.join(current_log_filename));
        }

        Ok(logger)
    }

    /// The file this logger writes to, if file logging is enabled.
    pub fn log_file(&self) -> Option<&Path> {
        self.current_log_file.as_deref()
    }

    /// Builds the filter: `RUST_LOG` if present, otherwise the configured level.
    fn env_filter(&self) -> Result<EnvFilter, LoggerError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.options.level)
                .map_err(|e| LoggerError::InvalidLevel(self.options.level.clone(), e.to_string())),
        }
    }

    /// Installs the global subscriber and returns the guard that flushes the file
    /// writer on drop.
    pub fn init(self) -> Result<LoggerGuard, LoggerError> {
        let filter = self.env_filter()?;

        let tty_layer = self
            .options
            .use_tty
            .then(|| fmt::layer().with_target(true).with_writer(std::io::stdout));

        let (file_layer, file_guard) = match &self.current_log_file {
            Some(path) => {
                let dir = path.parent().unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_else(|| format!("{}.log", self.app_name).into());
                let appender = tracing_appender::rolling::never(dir, file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer().with_ansi(false).with_target(true).with_writer(writer);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(tty_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| LoggerError::Init(e.to_string()))?;

        tracing::debug!(app = %self.app_name, log_file = ?self.current_log_file, "logger initialised");

        Ok(LoggerGuard {
            _file_guard: file_guard,
            log_file: self.current_log_file,
        })
    }
}
