//! Command-line arguments for the `raclette` binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use raclette_cache::{CacheConfig, CacheResult, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "raclette", about = "Raclette persistent blob cache", version)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen address, overrides server.bind-addr
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Store directory, overrides store.database.path
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Overwrite policy, overrides store.overwrite-existing
    #[arg(long)]
    pub overwrite_existing: Option<bool>,

    /// Log output format, overrides log.format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Load the configuration file (or defaults) and apply flag overrides.
    pub fn resolve_config(&self) -> CacheResult<CacheConfig> {
        let mut config = match &self.config {
            Some(path) => CacheConfig::load(path)?,
            None => CacheConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.server.bind_addr = bind;
        }
        if let Some(path) = &self.db_path {
            config.store.database.path = path.clone();
        }
        if let Some(overwrite) = self.overwrite_existing {
            config.store.overwrite_existing = overwrite;
        }
        if let Some(format) = self.log_format {
            config.log.format = format;
        }
        config.validate()?;
        Ok(config)
    }
}
