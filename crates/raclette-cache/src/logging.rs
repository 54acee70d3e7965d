//! Structured logging setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{CacheError, CacheResult};

/// Log output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format with colors (for development)
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
    /// JSON format (for production)
    Json,
}

/// Logging section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. "info,raclette_store=debug".
    /// `RUST_LOG` wins when set.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { format: LogFormat::default(), filter: "info".to_string() }
    }
}

impl LogConfig {
    fn env_filter(&self) -> CacheResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.filter)
                .map_err(|e| CacheError::Config(format!("invalid log filter {:?}: {}", self.filter, e))),
        }
    }
}

/// Install the global subscriber. Call once, from the binary.
pub fn init_logging(config: &LogConfig) -> CacheResult<()> {
    let subscriber = tracing_subscriber::fmt().with_env_filter(config.env_filter()?).with_target(true);

    let installed = match config.format {
        LogFormat::Pretty => subscriber.pretty().try_init(),
        LogFormat::Compact => subscriber.compact().try_init(),
        LogFormat::Json => subscriber.json().try_init(),
    };
    installed.map_err(|e| CacheError::Internal(format!("failed to initialize {:?} logger: {}", config.format, e)))?;

    tracing::info!(format = ?config.format, filter = %config.filter, "logging initialized");
    Ok(())
}
