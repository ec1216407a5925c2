//! Logging configuration and subscriber setup.
//!
//! Supports configuration via:
//! - Environment variables (RB_LOG, RUST_LOG, RB_LOG_FORMAT)
//! - Explicit overrides from the embedding application
//!
//! All log output goes to stderr, either human-readable or as JSON lines.

use std::io::IsTerminal;

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console format (default).
    #[default]
    Human,
    /// Machine-parseable JSON lines.
    Jsonl,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "console" | "pretty" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            _ => Err(format!("unknown log format: {}", s)),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Human => write!(f, "human"),
            LogFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Completely silent.
    Off,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" | "quiet" => Ok(LogLevel::Off),
            _ => Err(format!("unknown log level: {}", s)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Off => write!(f, "off"),
        }
    }
}

impl From<LogLevel> for tracing_subscriber::filter::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
            LogLevel::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
            LogLevel::Info => tracing_subscriber::filter::LevelFilter::INFO,
            LogLevel::Warn => tracing_subscriber::filter::LevelFilter::WARN,
            LogLevel::Error => tracing_subscriber::filter::LevelFilter::ERROR,
            LogLevel::Off => tracing_subscriber::filter::LevelFilter::OFF,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Whether to include timestamps in human output.
    pub timestamps: bool,
    /// Raw `RUST_LOG` directives, kept only when nothing more specific
    /// (RB_LOG or an explicit level) picked the level.
    pub rust_log: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            timestamps: true,
            rust_log: None,
        }
    }
}

impl LogConfig {
    /// Create config from the process environment and explicit overrides.
    pub fn from_env(level: Option<LogLevel>, format: Option<LogFormat>) -> Self {
        Self::from_lookup(|name| std::env::var(name).ok(), level, format)
    }

    /// Same as [`LogConfig::from_env`] with an injected environment.
    pub fn from_lookup<F>(lookup: F, level: Option<LogLevel>, format: Option<LogFormat>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LogConfig::default();

        // RB_LOG takes precedence over RUST_LOG
        if let Some(val) = lookup("RB_LOG") {
            if let Ok(level) = val.parse::<LogLevel>() {
                config.level = level;
            }
        } else if let Some(val) = lookup("RUST_LOG") {
            config.rust_log = Some(val.clone());
            if val.contains("trace") {
                config.level = LogLevel::Trace;
            } else if val.contains("debug") {
                config.level = LogLevel::Debug;
            } else if val.contains("warn") {
                config.level = LogLevel::Warn;
            } else if val.contains("error") {
                config.level = LogLevel::Error;
            }
        }

        if let Some(val) = lookup("RB_LOG_FORMAT") {
            if let Ok(format) = val.parse::<LogFormat>() {
                config.format = format;
            }
        }

        if let Some(level) = level {
            config = config.with_level(level);
        }
        if let Some(format) = format {
            config.format = format;
        }

        config
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self.rust_log = None;
        self
    }

    /// Enable timestamps in human output.
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Filter directives: the workspace crates at the resolved level, or the
    /// raw `RUST_LOG` value when that alone decided the level.
    pub fn filter_directives(&self) -> String {
        match &self.rust_log {
            Some(directives) => directives.clone(),
            None => self.crate_directives(),
        }
    }

    fn crate_directives(&self) -> String {
        format!(
            "rb_bag={level},rb_table={level},rb_msg={level}",
            level = self.level
        )
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.filter_directives())
            .unwrap_or_else(|_| EnvFilter::new(self.crate_directives()))
    }
}

/// Install the global subscriber writing to stderr.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = config.filter();

    match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);

            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
                    .is_ok()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
                    .is_ok()
            }
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init()
                .is_ok()
        }
    }
}

/// Initialize logging from the environment (for tests and simple cases).
pub fn init_default_logging() -> bool {
    init_logging(&LogConfig::from_env(None, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("human".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert_eq!("jsonl".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("quiet".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert_eq!(LogLevel::Debug.to_string(), "debug");
    }

    #[test]
    fn test_rb_log_beats_rust_log() {
        let config = LogConfig::from_lookup(
            env(&[("RB_LOG", "error"), ("RUST_LOG", "rb_bag=trace")]),
            None,
            None,
        );
        assert_eq!(config.level, LogLevel::Error);

        let config = LogConfig::from_lookup(env(&[("RUST_LOG", "rb_bag=debug")]), None, None);
        assert_eq!(config.level, LogLevel::Debug);
    }

    #[test]
    fn test_rb_log_decides_filter_over_rust_log() {
        let config = LogConfig::from_lookup(
            env(&[("RB_LOG", "debug"), ("RUST_LOG", "warn")]),
            None,
            None,
        );
        assert_eq!(
            config.filter_directives(),
            "rb_bag=debug,rb_table=debug,rb_msg=debug"
        );

        // RUST_LOG alone passes through untouched.
        let config = LogConfig::from_lookup(env(&[("RUST_LOG", "rb_table=trace,warn")]), None, None);
        assert_eq!(config.filter_directives(), "rb_table=trace,warn");

        // An explicit level outranks both variables.
        let config =
            LogConfig::from_lookup(env(&[("RUST_LOG", "trace")]), Some(LogLevel::Error), None);
        assert_eq!(
            config.filter_directives(),
            "rb_bag=error,rb_table=error,rb_msg=error"
        );

        let config = LogConfig::default();
        assert_eq!(config.filter_directives(), "rb_bag=info,rb_table=info,rb_msg=info");
    }

    #[test]
    fn test_format_env_and_overrides() {
        let config = LogConfig::from_lookup(env(&[("RB_LOG_FORMAT", "jsonl")]), None, None);
        assert_eq!(config.format, LogFormat::Jsonl);

        let config = LogConfig::from_lookup(
            env(&[("RB_LOG_FORMAT", "jsonl"), ("RB_LOG", "debug")]),
            Some(LogLevel::Warn),
            Some(LogFormat::Human),
        );
        assert_eq!(config.format, LogFormat::Human);
        assert_eq!(config.level, LogLevel::Warn);
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::default()
            .with_format(LogFormat::Jsonl)
            .with_level(LogLevel::Debug)
            .with_timestamps(false);
        assert_eq!(config.format, LogFormat::Jsonl);
        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.timestamps);
    }

    #[test]
    fn test_second_init_reports_existing_subscriber() {
        let config = LogConfig::default().with_level(LogLevel::Off);
        let _first = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
