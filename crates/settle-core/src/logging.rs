//! Log setup for harness binaries and test suites.
//!
//! Events go to stderr and, when a log directory is configured, to a
//! daily-rotated `<dir>/<name>.<date>.log` file without ANSI colors. The
//! filter comes from `RUST_LOG` when set, otherwise from
//! [`LogOptions::level`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Rotated log files kept on disk.
const MAX_LOG_FILES: usize = 3;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// File name prefix, e.g. `tests` for `logs/tests.2026-01-01.log`.
    pub name: String,
    /// Directory for log files. `None` disables file logging.
    pub dir: Option<PathBuf>,
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines on stderr instead of human-readable text.
    pub json: bool,
    /// Write to stderr at all.
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            name: "settle".to_string(),
            dir: None,
            level: "info".to_string(),
            json: false,
            console: true,
        }
    }
}

impl LogOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    #[must_use]
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }
}

/// Installs the global subscriber.
///
/// Returns the file writer's guard, which must be kept alive for buffered
/// lines to be flushed. Returns `None` when file logging is disabled or
/// when logging was already initialized.
pub fn init(options: LogOptions) -> Option<WorkerGuard> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return None;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.level.as_str()));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if options.console {
        let console = fmt::layer().with_writer(std::io::stderr).with_target(false);
        if options.json {
            layers.push(console.json().boxed());
        } else {
            layers.push(console.boxed());
        }
    }

    let mut guard = None;
    let mut file_error = None;
    if let Some(dir) = &options.dir {
        let appender = Builder::new()
            .rotation(Rotation::DAILY)
            .filename_prefix(options.name.as_str())
            .filename_suffix("log")
            .max_log_files(MAX_LOG_FILES)
            .build(dir);
        match appender {
            Ok(appender) => {
                let (writer, file_guard) = tracing_appender::non_blocking(appender);
                layers.push(fmt::layer().with_writer(writer).with_ansi(false).boxed());
                guard = Some(file_guard);
            }
            Err(e) => file_error = Some((dir.clone(), e)),
        }
    }

    if tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .is_err()
    {
        return None;
    }

    if let Some((dir, e)) = file_error {
        warn!(dir = %dir.display(), error = %e, "file logging disabled");
    }
    guard
}
