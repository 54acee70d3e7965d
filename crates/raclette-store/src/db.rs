//! Store handle: in-memory ordered table + WAL + checkpoints.
//!
//! **Read path**: served from the in-memory `BTreeMap` under a shared lock.
//! **Write path**: WAL append (and sync), then memtable update, both under
//! the WAL mutex so per-key order matches log order.
//! **Checkpoint**: once enough WAL has piled up, the table is snapshotted
//! and older WAL files are removed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};

use crate::batch::{BatchOp, WriteBatch};
use crate::checkpoint::{self, CheckpointResult};
use crate::error::{StoreError, StoreResult};
use crate::filter::KeyFilter;
use crate::format::{decode_batch, encode_batch, Operation, WalEntry};
use crate::options::{Options, WriteOptions};
use crate::platform::DirLock;
use crate::wal::{WalReader, WalWriter};

/// Subdirectory holding WAL and snapshot files
pub const WAL_DIR: &str = "wal";

/// Live key-value pairs plus the may-exist filter over their keys.
struct Memtable {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    filter: KeyFilter,
}

impl Memtable {
    fn new(filter_bits: u8) -> Self {
        Self { map: BTreeMap::new(), filter: KeyFilter::new(filter_bits) }
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        if !self.map.contains_key(&key) {
            self.filter.insert(&key);
        }
        self.map.insert(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        if self.map.remove(key).is_some() {
            self.filter.remove(key);
        }
    }

    fn apply_batch(&mut self, ops: Vec<BatchOp>) {
        for op in ops {
            match op {
                BatchOp::Put { key, value } => self.put(key, value),
                BatchOp::Delete { key } => self.delete(&key),
            }
        }
    }

    /// Replay one recovered record.
    fn replay(&mut self, entry: WalEntry) {
        match entry.operation {
            Operation::Put => self.put(entry.key, entry.value),
            Operation::Delete => self.delete(&entry.key),
            Operation::Batch => match decode_batch(&entry.value) {
                Ok(ops) => self.apply_batch(ops),
                Err(e) => tracing::warn!(error = %e, "undecodable batch record skipped during replay"),
            },
        }
    }
}

struct WalState {
    writer: WalWriter,
    /// WAL bytes appended since the last checkpoint (or replayed at open)
    since_checkpoint: u64,
}

/// Point-in-time counters for an open store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbStats {
    pub entries: usize,
    pub wal_sequence: u64,
    pub wal_bytes_since_checkpoint: u64,
}

/// Handle to an open store directory.
///
/// All methods take `&self`; share it across threads with `Arc`. Readers
/// run concurrently; writers serialize on the WAL mutex. The directory lock
/// is held until the handle is closed or dropped.
pub struct Db {
    memtable: RwLock<Memtable>,
    wal: Mutex<WalState>,
    path: PathBuf,
    wal_dir: PathBuf,
    options: Options,
    _lock: DirLock,
}

impl Db {
    /// Open the store rooted at `path`.
    ///
    /// Fails with `NotFound` when the store is absent and
    /// `create_if_missing` is off, `AlreadyExists` when it is present and
    /// `error_if_exists` is on, and `Locked` when another handle has it open.
    pub fn open<P: AsRef<Path>>(path: P, options: &Options) -> StoreResult<Self> {
        options.validate().map_err(StoreError::InvalidOptions)?;

        let path = path.as_ref().to_path_buf();
        let wal_dir = path.join(WAL_DIR);
        let exists = wal_dir.is_dir();

        if !exists && !options.create_if_missing {
            return Err(StoreError::NotFound { path });
        }
        if exists && options.error_if_exists {
            return Err(StoreError::AlreadyExists { path });
        }
        std::fs::create_dir_all(&wal_dir)
            .map_err(|e| StoreError::io_at(&wal_dir, e, "Failed to create store directory"))?;

        let lock = DirLock::acquire(&path)?;

        let recovery = WalReader::new(&wal_dir).recover()?;
        let mut memtable = Memtable::new(options.filter_bits);
        let replayed = recovery.entries.len();
        for entry in recovery.entries {
            memtable.replay(entry);
        }

        let stale = checkpoint::remove_stale(&wal_dir)?;
        if stale > 0 {
            tracing::debug!(path = %path.display(), stale, "removed empty WAL and orphaned temp files");
        }

        // Appends never follow a possibly torn tail: each open gets a new file
        let writer = WalWriter::open(&wal_dir, recovery.last_sequence + 1, options.wal_rotation_bytes)?;

        tracing::info!(
            path = %path.display(),
            entries = memtable.map.len(),
            replayed,
            snapshot = recovery.snapshot_sequence,
            "store opened"
        );

        Ok(Self {
            memtable: RwLock::new(memtable),
            wal: Mutex::new(WalState { writer, since_checkpoint: recovery.wal_bytes }),
            path,
            wal_dir,
            options: options.clone(),
            _lock: lock,
        })
    }

    fn check_key(&self, key: &[u8]) -> StoreResult<()> {
        if key.len() > self.options.max_key_size {
            return Err(StoreError::OversizedEntry {
                entry_size: key.len() as u64,
                max_size: self.options.max_key_size as u64,
                component: "key".to_string(),
            });
        }
        Ok(())
    }

    fn check_value(&self, value: &[u8]) -> StoreResult<()> {
        if value.len() > self.options.max_value_size {
            return Err(StoreError::OversizedEntry {
                entry_size: value.len() as u64,
                max_size: self.options.max_value_size as u64,
                component: "value".to_string(),
            });
        }
        Ok(())
    }

    /// Append one record, then apply `update` to the memtable.
    ///
    /// If the append fails the memtable is never touched.
    fn log_and_apply<F>(&self, opts: &WriteOptions, key: &[u8], value: &[u8], op: Operation, update: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Memtable),
    {
        let mut wal = self.wal.lock();
        let written = if opts.sync {
            wal.writer.append_durable(key, value, op)?
        } else {
            wal.writer.append_fast(key, value, op)?
        };
        update(&mut *self.memtable.write());
        wal.since_checkpoint += written;

        if wal.since_checkpoint >= self.options.checkpoint_trigger_bytes {
            // The write itself is already durable; a failed checkpoint only
            // means the WAL keeps growing until the next attempt.
            if let Err(e) = self.checkpoint_locked(&mut wal) {
                tracing::warn!(path = %self.path.display(), error = %e, "automatic checkpoint failed");
            }
        }
        Ok(())
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.put_opt(&WriteOptions::default(), key, value)
    }

    pub fn put_opt(&self, opts: &WriteOptions, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.check_key(key)?;
        self.check_value(value)?;
        self.log_and_apply(opts, key, value, Operation::Put, |table| {
            table.put(key.to_vec(), value.to_vec())
        })
    }

    /// Get the committed value for `key`.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.memtable.read().map.get(key).cloned())
    }

    /// Delete `key`. Deleting an absent key succeeds and is still logged.
    pub fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.delete_opt(&WriteOptions::default(), key)
    }

    pub fn delete_opt(&self, opts: &WriteOptions, key: &[u8]) -> StoreResult<()> {
        self.check_key(key)?;
        self.log_and_apply(opts, key, &[], Operation::Delete, |table| table.delete(key))
    }

    /// Cheap existence probe. `false` means absent; `true` means the key
    /// is probably present and must be confirmed with `get`.
    pub fn may_exist(&self, key: &[u8]) -> bool {
        self.memtable.read().filter.may_contain(key)
    }

    /// Definite existence check.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.memtable.read().map.contains_key(key)
    }

    /// Apply every operation in `batch` atomically, as one WAL record.
    pub fn write(&self, opts: &WriteOptions, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        for op in batch.ops() {
            self.check_key(op.key())?;
            if let BatchOp::Put { value, .. } = op {
                self.check_value(value)?;
            }
        }
        let encoded = encode_batch(batch.ops())?;
        let ops = batch.into_ops();
        self.log_and_apply(opts, &[], &encoded, Operation::Batch, move |table| table.apply_batch(ops))
    }

    /// Sync the WAL, making every earlier unsynced write durable.
    pub fn flush_wal(&self) -> StoreResult<()> {
        self.wal.lock().writer.sync()
    }

    /// Snapshot the table and drop the WAL files it covers.
    pub fn checkpoint(&self) -> StoreResult<CheckpointResult> {
        let mut wal = self.wal.lock();
        self.checkpoint_locked(&mut wal)
    }

    fn checkpoint_locked(&self, wal: &mut WalState) -> StoreResult<CheckpointResult> {
        let sequence = wal.writer.sequence() + 1;
        // Writes after this point land past the snapshot. If the snapshot
        // fails, every WAL file it would have superseded is still replayed.
        wal.writer.switch_to(sequence + 1)?;
        let (snapshot_path, snapshot_bytes, live_entries) = {
            let table = self.memtable.read();
            let live = table.map.iter().map(|(k, v)| (k.as_slice(), v.as_slice()));
            checkpoint::write_snapshot(&self.wal_dir, sequence, live)?
        };
        let removed_files = checkpoint::remove_obsolete(&self.wal_dir, sequence)?;
        wal.since_checkpoint = 0;

        tracing::info!(
            path = %self.path.display(),
            sequence,
            live_entries,
            snapshot_bytes,
            removed_files,
            "checkpoint written"
        );

        Ok(CheckpointResult { snapshot_path, sequence, live_entries, snapshot_bytes, removed_files })
    }

    pub fn len(&self) -> usize {
        self.memtable.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memtable.read().map.is_empty()
    }

    pub fn stats(&self) -> DbStats {
        let wal = self.wal.lock();
        DbStats {
            entries: self.len(),
            wal_sequence: wal.writer.sequence(),
            wal_bytes_since_checkpoint: wal.since_checkpoint,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Sync the WAL and release the directory lock.
    pub fn close(self) -> StoreResult<()> {
        self.flush_wal()
        // Drop releases the lock
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        if let Err(e) = self.wal.lock().writer.sync() {
            tracing::error!(path = %self.path.display(), error = %e, "WAL sync on close failed");
        }
        tracing::debug!(path = %self.path.display(), "store closed");
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish()
    }
}
