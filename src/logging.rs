//! Tracing subscriber setup.
//!
//! Logs go to stderr; stdout is reserved for command output.

use std::str::FromStr;

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

use crate::config::keys::{LOGGER_FORMAT, LOGGER_LEVEL};
use crate::config::Configuration;
use crate::errors::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Filter and format to log with.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub filter: String,
    pub format: LogFormat,
}

impl LogSettings {
    /// `RUST_LOG` wins over `quorumsh.logger.level`; `format` overrides
    /// `quorumsh.logger.format`.
    pub fn from_config(conf: &Configuration, format: Option<LogFormat>) -> Result<Self, ConfigError> {
        let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(filter) if !filter.is_empty() => filter,
            _ => conf.get(&LOGGER_LEVEL)?,
        };
        let format = match format {
            Some(f) => f,
            None => conf.get_enum(&LOGGER_FORMAT)?,
        };
        Ok(Self { filter, format })
    }
}

/// Install the global subscriber.  A second call is a no-op.
pub fn init(settings: &LogSettings) {
    let filter = EnvFilter::try_new(&settings.filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match settings.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
