//! Structured logging for vo2lab
//!
//! Console output goes to stderr so tables printed by the CLI stay clean on
//! stdout. An optional JSON file layer records accepted and rejected phase
//! submissions for the lab's audit trail.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// `[logging]` section of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Base level before `-v` flags are applied
    pub level: LogLevel,

    /// Console format
    pub format: LogFormat,

    /// JSON log file, console only when unset
    pub file_path: Option<PathBuf>,

    /// Start a new file each day instead of appending to one
    pub rotation: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            file_path: None,
            rotation: true,
        }
    }
}

impl LogConfig {
    /// Raise the configured level by `verbose` steps (`-v`, `-vv`, ...)
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        for _ in 0..verbose {
            self.level = self.level.more_verbose();
        }
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("vo2lab={}", self.level.as_str())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    fn more_verbose(self) -> Self {
        match self {
            LogLevel::Error => LogLevel::Warn,
            LogLevel::Warn => LogLevel::Info,
            LogLevel::Info => LogLevel::Debug,
            LogLevel::Debug | LogLevel::Trace => LogLevel::Trace,
        }
    }
}

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-readable
    Pretty,
    Json,
    /// Single line per event
    Compact,
}

/// Install the global subscriber described by `config`
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let console = match config.format {
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    };

    let registry = tracing_subscriber::registry()
        .with(config.filter())
        .with(console);

    match &config.file_path {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            fs::create_dir_all(dir)?;

            let file_layer = if config.rotation {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("vo2lab.log");
                let appender = tracing_appender::rolling::daily(dir, name);
                fmt::layer().json().with_writer(appender).boxed()
            } else {
                let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
                fmt::layer().json().with_writer(file).boxed()
            };

            registry.with(file_layer).try_init()?;
        }
        None => registry.try_init()?,
    }

    tracing::debug!(
        level = config.level.as_str(),
        format = ?config.format,
        file = ?config.file_path,
        "Logging initialized"
    );

    Ok(())
}
