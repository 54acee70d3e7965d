//! Raclette Store: embedded ordered key-value engine
//!
//! Keys and values are arbitrary byte strings. The live table is held in
//! memory in key order; a CRC32C-framed write-ahead log provides crash
//! safety and periodic snapshots keep the log bounded.
//!
//! # Architecture
//!
//! - **Read path**: ordered in-memory table behind a shared lock
//! - **Write path**: WAL first, then table update
//! - **Checkpoint**: snapshot the table, drop the WAL it covers
//! - **Transactions**: buffered writes committed as one batch record
//!
//! One directory is opened by at most one handle at a time, enforced by a
//! `LOCK` file.

pub mod batch;
pub mod checkpoint;
pub mod db;
pub mod error;
pub mod filter;
pub mod format;
pub mod options;
pub mod platform;
pub mod transaction;
pub mod wal;

pub use batch::{BatchOp, WriteBatch};
pub use checkpoint::CheckpointResult;
pub use db::{Db, DbStats};
pub use error::{StoreError, StoreResult};
pub use format::Operation;
pub use options::{Options, ReadOptions, WriteOptions};
pub use transaction::{Transaction, TransactionDb};
pub use wal::{WalReader, WalWriter};
