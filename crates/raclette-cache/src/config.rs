//! Cache configuration loaded from TOML.
//!
//! The store section also answers to `rocksDB`, and its keys are
//! kebab-case, so existing property names keep working.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use raclette_store::Options;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};
use crate::logging::LogConfig;

/// Largest payload the engine will accept as one value.
pub const MAX_PAYLOAD_CEILING: u64 = 1024 * 1024 * 1024;

/// Top-level configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(alias = "rocksDB")]
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StoreConfig {
    pub database: DatabaseConfig,
    /// Replace existing entries on save instead of rejecting them
    pub overwrite_existing: bool,
    pub create_if_missing: bool,
    pub max_payload_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            overwrite_existing: true,
            create_if_missing: true,
            max_payload_bytes: 64 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Engine options derived from this section.
    pub fn engine_options(&self) -> Options {
        Options::default()
            .set_create_if_missing(self.create_if_missing)
            .set_max_value_size(self.max_payload_bytes as usize)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("rocks-db") }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)) }
    }
}

impl CacheConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> CacheResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> CacheResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| CacheError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CacheResult<()> {
        let max = self.store.max_payload_bytes;
        if max == 0 || max > MAX_PAYLOAD_CEILING {
            return Err(CacheError::Config(format!(
                "store.max-payload-bytes must be in [1, {}], got {}",
                MAX_PAYLOAD_CEILING, max
            )));
        }
        if self.store.database.path.as_os_str().is_empty() {
            return Err(CacheError::Config("store.database.path must not be empty".into()));
        }
        self.store.engine_options().validate().map_err(CacheError::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    #[test]
    fn default_config() {
        let c = CacheConfig::default();
        assert_eq!(c.store.database.path, PathBuf::from("rocks-db"));
        assert!(c.store.overwrite_existing);
        assert!(c.store.create_if_missing);
        assert_eq!(c.store.max_payload_bytes, 64 * 1024 * 1024);
        assert_eq!(c.server.bind_addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn empty_file_uses_defaults() {
        assert_eq!(CacheConfig::from_toml("").unwrap(), CacheConfig::default());
    }

    #[test]
    fn full_file() {
        let c = CacheConfig::from_toml(
            r#"
            [store]
            overwrite-existing = false
            max-payload-bytes = 1024

            [store.database]
            path = "/var/lib/raclette"

            [server]
            bind-addr = "0.0.0.0:9000"

            [log]
            format = "json"
            filter = "debug"
            "#,
        )
        .unwrap();
        assert!(!c.store.overwrite_existing);
        assert_eq!(c.store.max_payload_bytes, 1024);
        assert_eq!(c.store.database.path, PathBuf::from("/var/lib/raclette"));
        assert_eq!(c.server.bind_addr.port(), 9000);
        assert_eq!(c.log.format, LogFormat::Json);
    }

    #[test]
    fn rocksdb_section_alias() {
        let c = CacheConfig::from_toml(
            r#"
            [rocksDB]
            overwrite-existing = false

            [rocksDB.database]
            path = "legacy-db"
            "#,
        )
        .unwrap();
        assert!(!c.store.overwrite_existing);
        assert_eq!(c.store.database.path, PathBuf::from("legacy-db"));
    }

    #[test]
    fn rejects_zero_payload_limit() {
        let err = CacheConfig::from_toml("[store]\nmax-payload-bytes = 0").unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[test]
    fn rejects_unparseable_file() {
        assert!(matches!(CacheConfig::from_toml("[server]\nbind-addr = 7"), Err(CacheError::Config(_))));
    }

    #[test]
    fn engine_options_follow_store_section() {
        let store = StoreConfig { create_if_missing: false, max_payload_bytes: 4096, ..StoreConfig::default() };
        let opts = store.engine_options();
        assert!(!opts.create_if_missing);
        assert_eq!(opts.max_value_size, 4096);
    }
}
