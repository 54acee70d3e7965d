//! Error types for store operations
//!
//! Every engine failure is a `StoreError`. Variants carry the file path and
//! byte offset where it helps recovery and debugging.

use std::path::PathBuf;

/// Store error types with detailed context
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// I/O operation failed
    #[error("I/O error{}: {message} ({kind})", fmt_path(.path))]
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// The store directory does not exist and `create_if_missing` is off
    #[error("store directory {} does not exist (create_if_missing is disabled)", .path.display())]
    NotFound { path: PathBuf },

    /// The store already exists and `error_if_exists` is on
    #[error("store already exists at {}", .path.display())]
    AlreadyExists { path: PathBuf },

    /// Another handle holds the directory lock
    #[error("store at {} is locked by another handle", .path.display())]
    Locked { path: PathBuf },

    /// WAL file is corrupted and cannot be recovered
    #[error("WAL corrupted in {} at offset {offset}: {reason}", .path.display())]
    WalCorrupted {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// Checksum verification failed
    #[error(
        "checksum mismatch in {} at offset {offset}: expected 0x{expected:08x}, got 0x{actual:08x}",
        .path.display()
    )]
    ChecksumMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
        offset: u64,
    },

    /// Torn write detected (partial write at end of file)
    #[error(
        "torn write in {} at offset {offset}: expected {expected_size} bytes, only {available_bytes} available",
        .path.display()
    )]
    TornWrite {
        path: PathBuf,
        expected_size: u32,
        available_bytes: u64,
        offset: u64,
    },

    /// Magic bytes not found at expected location
    #[error(
        "magic bytes not found in {} at offset {offset}: found {:02x}{:02x}{:02x}{:02x}",
        .path.display(), .found_bytes[0], .found_bytes[1], .found_bytes[2], .found_bytes[3]
    )]
    NoMagicFound {
        path: PathBuf,
        offset: u64,
        found_bytes: [u8; 4],
    },

    /// Entry size exceeds maximum allowed
    #[error("entry {component} too large: {entry_size} bytes exceeds limit of {max_size} bytes")]
    OversizedEntry {
        entry_size: u64,
        max_size: u64,
        /// Whether it's the key or value that's oversized
        component: String,
    },

    /// Options failed validation
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

fn fmt_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}

impl StoreError {
    /// Build an `Io` error bound to a path.
    pub(crate) fn io_at(path: impl Into<PathBuf>, err: std::io::Error, what: &str) -> Self {
        StoreError::Io {
            path: Some(path.into()),
            kind: err.kind(),
            message: format!("{}: {}", what, err),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
