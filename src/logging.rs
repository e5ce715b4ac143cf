//! Logging setup for tweetkeep.
//!
//! Structured logging on top of `tracing`. Scheduled runs (sync, reconcile,
//! import) report only success or failure to their caller, so the log is the
//! place where page counts, chunk lookups and deletions are recorded.
//!
//! # Usage
//!
//! ```rust
//! use tweetkeep::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default());
//! tracing::info!("Archive opened");
//! ```

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display.
    pub level: LogLevel,
    /// Output format for log messages.
    pub format: LogFormat,
    /// Include timestamps in log output.
    pub timestamps: bool,
    /// Include target (module path) in log output.
    pub target: bool,
    /// Include span events (enter/exit).
    pub spans: bool,
    /// Enable ANSI colors in output.
    pub colors: bool,
}

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Off,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line format.
    Pretty,
    /// Compact single-line format.
    Compact,
    /// Full format with thread, file and line details.
    Full,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            timestamps: true,
            target: false,
            spans: false,
            colors: true,
        }
    }
}

impl LogConfig {
    /// Errors only.
    #[must_use]
    pub const fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            timestamps: false,
            target: false,
            spans: false,
            colors: true,
        }
    }

    /// Debug level, module targets shown.
    #[must_use]
    pub const fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            timestamps: true,
            target: true,
            spans: false,
            colors: true,
        }
    }

    /// Everything, including span enter/exit.
    #[must_use]
    pub const fn trace() -> Self {
        Self {
            level: LogLevel::Trace,
            format: LogFormat::Full,
            timestamps: true,
            target: true,
            spans: true,
            colors: true,
        }
    }
}

impl LogLevel {
    /// Convert to env filter directive string.
    const fn to_filter_string(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
            Self::Off => "off",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" | "e" => Ok(Self::Error),
            "warn" | "warning" | "w" => Ok(Self::Warn),
            "info" | "i" => Ok(Self::Info),
            "debug" | "d" => Ok(Self::Debug),
            "trace" | "t" => Ok(Self::Trace),
            "off" | "none" | "quiet" => Ok(Self::Off),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "p" => Ok(Self::Pretty),
            "compact" | "c" => Ok(Self::Compact),
            "full" | "f" => Ok(Self::Full),
            _ => Err(format!("Invalid log format: {s}")),
        }
    }
}

/// Initialize the logging system with the given configuration.
///
/// Logs go to stderr so JSON output on stdout stays parseable.
/// Subsequent calls are ignored.
pub fn init_logging(config: &LogConfig) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(format!("tweetkeep={}", config.level.to_filter_string()))
    };

    let span_events = if config.spans {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.colors)
        .with_target(config.target)
        .with_span_events(span_events);

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => {
            let layer = base.pretty();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer)
                .try_init()
                .ok();
        }
        (LogFormat::Pretty, false) => {
            let layer = base.pretty().without_time();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer)
                .try_init()
                .ok();
        }
        (LogFormat::Compact, true) => {
            let layer = base.compact();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer)
                .try_init()
                .ok();
        }
        (LogFormat::Compact, false) => {
            let layer = base.compact().without_time();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer)
                .try_init()
                .ok();
        }
        (LogFormat::Full, _) => {
            let layer = base
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer)
                .try_init()
                .ok();
        }
    }
}

/// Initialize logging for tests (silent by default).
pub fn init_test_logging() {
    let config = LogConfig {
        level: LogLevel::Off,
        ..Default::default()
    };
    init_logging(&config);
}

/// Initialize logging with defaults suitable for CLI use.
pub fn init_cli_logging(quiet: bool, verbose: bool, colors: bool) {
    let mut config = if quiet {
        LogConfig::quiet()
    } else if verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    config.colors = colors;
    init_logging(&config);
}

/// Logs the start and end of a scheduled operation.
pub struct OperationGuard {
    name: &'static str,
    start: std::time::Instant,
}

impl OperationGuard {
    /// Start tracking an operation.
    pub fn new(name: &'static str) -> Self {
        tracing::info!(operation = name, "Starting operation");
        Self {
            name,
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since the operation started.
    #[must_use]
    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    /// Complete the operation successfully.
    pub fn complete(self, items: usize) {
        tracing::info!(
            operation = self.name,
            items,
            duration_ms = self.elapsed_ms(),
            "Operation completed"
        );
    }

    /// Mark the operation as failed.
    pub fn fail(self, error: &dyn std::error::Error) {
        tracing::error!(
            operation = self.name,
            duration_ms = self.elapsed_ms(),
            error = %error,
            "Operation failed"
        );
    }

    /// Record the outcome of a result and pass it through.
    ///
    /// # Errors
    ///
    /// Returns the input error unchanged.
    pub fn finish<T, E, F>(self, result: Result<T, E>, count: F) -> Result<T, E>
    where
        E: std::error::Error,
        F: FnOnce(&T) -> usize,
    {
        match &result {
            Ok(value) => self.complete(count(value)),
            Err(e) => self.fail(e),
        }
        result
    }
}
