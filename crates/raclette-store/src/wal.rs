//! Write-ahead log
//!
//! Every acknowledged write is appended here before the in-memory table
//! changes. Write ordering:
//! 1. serialize the record (with CRC32C)
//! 2. append it to the current WAL file
//! 3. durable_sync() when the write asks for it
//! 4. return; only now may the caller touch the memtable
//!
//! WAL files (`wal-{seq}.log`) and snapshot files (`snap-{seq}.log`) share
//! one directory and one sequence space. Recovery loads the newest snapshot
//! and replays every WAL file with a higher sequence.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::format::{deserialize_entry, serialize_entry, Operation, WalEntry, HEADER_SIZE, MAGIC_ARRAY};
use crate::platform::durable_sync;

pub const WAL_PREFIX: &str = "wal-";
pub const SNAPSHOT_PREFIX: &str = "snap-";
pub const FILE_SUFFIX: &str = ".log";

/// File name for a sequence number, e.g. `wal-000000000000002a.log`
pub fn file_name(prefix: &str, sequence: u64) -> String {
    format!("{}{:016x}{}", prefix, sequence, FILE_SUFFIX)
}

/// List `(sequence, path)` pairs for files with `prefix`, ascending.
pub fn list_files(dir: &Path, prefix: &str) -> StoreResult<Vec<(u64, PathBuf)>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| StoreError::io_at(dir, e, "Failed to read WAL directory"))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io_at(dir, e, "Failed to read directory entry"))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(hex) = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
        else {
            continue;
        };
        if let Ok(seq) = u64::from_str_radix(hex, 16) {
            files.push((seq, path));
        }
    }
    files.sort();
    Ok(files)
}

/// Appends records to the current WAL file.
///
/// `append_*` must complete before the caller updates the memtable.
pub struct WalWriter {
    file: File,
    path: PathBuf,
    /// Current file size in bytes (tracked to avoid stat calls)
    size: u64,
    wal_dir: PathBuf,
    sequence: u64,
    rotation_bytes: u64,
}

impl WalWriter {
    /// Open the WAL in `wal_dir`, resuming the highest existing WAL file or
    /// starting at `min_sequence`, whichever is later.
    pub fn open<P: AsRef<Path>>(wal_dir: P, min_sequence: u64, rotation_bytes: u64) -> StoreResult<Self> {
        let wal_dir = wal_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&wal_dir)
            .map_err(|e| StoreError::io_at(&wal_dir, e, "Failed to create WAL directory"))?;

        let existing = list_files(&wal_dir, WAL_PREFIX)?
            .last()
            .map(|(seq, _)| *seq)
            .unwrap_or(0);
        let sequence = existing.max(min_sequence);
        let (file, path, size) = Self::open_file(&wal_dir, sequence)?;

        Ok(Self { file, path, size, wal_dir, sequence, rotation_bytes })
    }

    fn open_file(wal_dir: &Path, sequence: u64) -> StoreResult<(File, PathBuf, u64)> {
        let path = wal_dir.join(file_name(WAL_PREFIX, sequence));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io_at(&path, e, "Failed to open WAL file"))?;
        let size = file
            .metadata()
            .map_err(|e| StoreError::io_at(&path, e, "Failed to stat WAL file"))?
            .len();
        Ok((file, path, size))
    }

    /// Append a record and sync it to stable storage. Returns the bytes written.
    pub fn append_durable(&mut self, key: &[u8], value: &[u8], op: Operation) -> StoreResult<u64> {
        let written = self.append_fast(key, value, op)?;
        self.sync()?;
        Ok(written)
    }

    /// Append a record without syncing; it sits in the OS page cache until
    /// the next `sync` or durable append. Returns the bytes written.
    pub fn append_fast(&mut self, key: &[u8], value: &[u8], op: Operation) -> StoreResult<u64> {
        let entry_bytes = serialize_entry(key, value, op)?;

        if self.size > 0 && self.size + entry_bytes.len() as u64 > self.rotation_bytes {
            self.rotate()?;
        }

        self.file
            .write_all(&entry_bytes)
            .map_err(|e| StoreError::io_at(&self.path, e, "WAL write failed"))?;

        self.size += entry_bytes.len() as u64;
        Ok(entry_bytes.len() as u64)
    }

    fn rotate(&mut self) -> StoreResult<()> {
        let next = self.sequence + 1;
        self.switch_to(next)
    }

    /// Sync the current file and continue in a new file at `sequence`.
    pub fn switch_to(&mut self, sequence: u64) -> StoreResult<()> {
        self.sync()?;
        let (file, path, size) = Self::open_file(&self.wal_dir, sequence)?;
        tracing::debug!(from = %self.path.display(), to = %path.display(), "WAL rotated");
        self.file = file;
        self.path = path;
        self.size = size;
        self.sequence = sequence;
        Ok(())
    }

    /// Sync the current WAL file without writing a record.
    pub fn sync(&self) -> StoreResult<()> {
        durable_sync(&self.file).map_err(|e| StoreError::io_at(&self.path, e, "WAL durable_sync failed"))
    }

    pub fn current_path(&self) -> &Path {
        &self.path
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Entries recovered from a WAL directory.
#[derive(Debug, Default)]
pub struct Recovery {
    /// Sequence of the snapshot that seeded recovery, 0 if none
    pub snapshot_sequence: u64,
    /// Snapshot entries first, then WAL entries in append order
    pub entries: Vec<WalEntry>,
    /// Total WAL bytes replayed on top of the snapshot
    pub wal_bytes: u64,
    /// Highest snapshot or WAL sequence present, 0 if none
    pub last_sequence: u64,
}

/// Replays snapshot and WAL files.
pub struct WalReader {
    wal_dir: PathBuf,
}

impl WalReader {
    pub fn new<P: AsRef<Path>>(wal_dir: P) -> Self {
        Self { wal_dir: wal_dir.as_ref().to_path_buf() }
    }

    /// Recover the newest snapshot plus all later WAL files.
    pub fn recover(&self) -> StoreResult<Recovery> {
        let mut recovery = Recovery::default();
        if !self.wal_dir.exists() {
            return Ok(recovery);
        }

        if let Some((seq, path)) = list_files(&self.wal_dir, SNAPSHOT_PREFIX)?.pop() {
            recovery.snapshot_sequence = seq;
            recovery.last_sequence = seq;
            recovery.entries = self.recover_from_file(&path)?;
        }

        for (seq, path) in list_files(&self.wal_dir, WAL_PREFIX)? {
            recovery.last_sequence = recovery.last_sequence.max(seq);
            if seq <= recovery.snapshot_sequence {
                continue;
            }
            let entries = self.recover_from_file(&path)?;
            recovery.wal_bytes += std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            recovery.entries.extend(entries);
        }

        Ok(recovery)
    }

    /// Recover entries from a single file.
    ///
    /// Bad magic or a checksum mismatch resyncs at the next magic; an
    /// incomplete record at end of file is the crash point and ends the file.
    pub fn recover_from_file(&self, path: &Path) -> StoreResult<Vec<WalEntry>> {
        let mut file = File::open(path)
            .map_err(|e| StoreError::io_at(path, e, "Failed to open WAL file for recovery"))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .map_err(|e| StoreError::io_at(path, e, "Failed to read WAL file"))?;

        let mut entries = Vec::new();
        let mut offset = 0;

        while offset + HEADER_SIZE <= buffer.len() {
            if buffer[offset..offset + 4] != MAGIC_ARRAY {
                tracing::warn!(file = %path.display(), offset, "bad magic, scanning for next record");
                match find_next_magic(&buffer, offset + 1) {
                    Some(next) => {
                        offset = next;
                        continue;
                    }
                    None => break,
                }
            }

            let length = u32::from_le_bytes([
                buffer[offset + 4],
                buffer[offset + 5],
                buffer[offset + 6],
                buffer[offset + 7],
            ]) as usize;
            let total = HEADER_SIZE + length;

            if offset + total > buffer.len() {
                tracing::warn!(
                    file = %path.display(),
                    offset,
                    needed = total,
                    available = buffer.len() - offset,
                    "torn write, stopping replay of this file"
                );
                break;
            }

            match deserialize_entry(&buffer[offset..offset + total]) {
                Ok(entry) => {
                    entries.push(entry);
                    offset += total;
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), offset, error = %e, "corrupt record skipped");
                    match find_next_magic(&buffer, offset + 1) {
                        Some(next) => {
                            offset = next;
                            continue;
                        }
                        None => break,
                    }
                }
            }
        }

        Ok(entries)
    }
}

/// Scan forward for the next record magic (resync after corruption).
fn find_next_magic(buffer: &[u8], start: usize) -> Option<usize> {
    if buffer.len() < 4 {
        return None;
    }
    (start..=buffer.len() - 4).find(|&i| buffer[i..i + 4] == MAGIC_ARRAY)
}
