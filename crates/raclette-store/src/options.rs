//! Option records for opening a store and for individual reads and writes
//!
//! `Options` is built once at startup and handed to `Db::open`. The read and
//! write records are small per-call values.

/// Store-wide options, fixed for the lifetime of an open handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Create the store directory if it does not exist
    pub create_if_missing: bool,
    /// Fail to open if the directory already holds a store
    pub error_if_exists: bool,
    /// Maximum key size in bytes
    pub max_key_size: usize,
    /// Maximum value size in bytes
    pub max_value_size: usize,
    /// WAL file rotation threshold (bytes)
    pub wal_rotation_bytes: u64,
    /// Write a snapshot and drop old WAL files once this many WAL bytes
    /// have accumulated since the last checkpoint
    pub checkpoint_trigger_bytes: u64,
    /// Width of the may-exist fingerprints, in bits (1..=32)
    pub filter_bits: u8,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_create_if_missing(mut self, create_if_missing: bool) -> Self {
        self.create_if_missing = create_if_missing;
        self
    }

    pub fn set_error_if_exists(mut self, error_if_exists: bool) -> Self {
        self.error_if_exists = error_if_exists;
        self
    }

    pub fn set_max_value_size(mut self, max_value_size: usize) -> Self {
        self.max_value_size = max_value_size;
        self
    }

    pub fn set_checkpoint_trigger_bytes(mut self, bytes: u64) -> Self {
        self.checkpoint_trigger_bytes = bytes;
        self
    }

    pub fn set_filter_bits(mut self, bits: u8) -> Self {
        self.filter_bits = bits;
        self
    }

    /// Validate all option values
    pub fn validate(&self) -> Result<(), String> {
        if self.max_key_size == 0 || self.max_key_size > u16::MAX as usize {
            return Err(format!("max_key_size must be in [1, {}]", u16::MAX));
        }
        if self.max_value_size == 0 || self.max_value_size > 1024 * 1024 * 1024 {
            return Err("max_value_size must be in [1, 1GB]".into());
        }
        if self.wal_rotation_bytes < 64 * 1024 {
            return Err("wal_rotation_bytes must be >= 64KB".into());
        }
        if self.checkpoint_trigger_bytes == 0 {
            return Err("checkpoint_trigger_bytes must be > 0".into());
        }
        if self.filter_bits == 0 || self.filter_bits > 32 {
            return Err("filter_bits must be in [1, 32]".into());
        }
        Ok(())
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: false,
            error_if_exists: false,
            max_key_size: 4096,
            max_value_size: 256 * 1024 * 1024,
            wal_rotation_bytes: 64 * 1024 * 1024,
            checkpoint_trigger_bytes: 256 * 1024 * 1024,
            filter_bits: 32,
        }
    }
}

/// Per-write options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Sync the WAL to stable storage before acknowledging the write
    pub sync: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { sync: true }
    }
}

/// Per-read options for transactional reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Let a transaction see its own uncommitted writes
    pub read_own_writes: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { read_own_writes: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_valid() {
        assert!(Options::default().validate().is_ok());
        assert!(!Options::default().create_if_missing);
    }

    #[test]
    fn test_setters_chain() {
        let opts = Options::new()
            .set_create_if_missing(true)
            .set_error_if_exists(true)
            .set_filter_bits(8);
        assert!(opts.create_if_missing);
        assert!(opts.error_if_exists);
        assert_eq!(opts.filter_bits, 8);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Options::default().set_filter_bits(0).validate().is_err());
        assert!(Options::default().set_filter_bits(33).validate().is_err());
        assert!(Options::default().set_max_value_size(0).validate().is_err());
        assert!(Options::default().set_checkpoint_trigger_bytes(0).validate().is_err());

        let mut opts = Options::default();
        opts.max_key_size = 70_000;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_write_and_read_defaults() {
        assert!(WriteOptions::default().sync);
        assert!(ReadOptions::default().read_own_writes);
    }
}
