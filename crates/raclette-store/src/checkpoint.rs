//! Checkpoints: snapshot the live table so old WAL files can go.
//!
//! Uses the atomic rename pattern:
//! 1. Write every live entry to `snap-{seq}.log.tmp`
//! 2. durable_sync the temp file
//! 3. Rename it to `snap-{seq}.log` (atomic on POSIX)
//! 4. Sync the directory
//! 5. Remove WAL files with sequence <= seq, older snapshots and orphaned
//!    temp files
//!
//! The caller moves the WAL writer past `seq` before step 1, so no write
//! made after the snapshot can land in a file the snapshot supersedes.
//!
//! A crash before step 3 leaves an orphaned temp file and the old state
//! intact. After step 3 recovery starts from the new snapshot, and any
//! leftover older files are ignored and removed at the next checkpoint.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::format::{serialize_entry, Operation};
use crate::platform::{durable_sync, sync_directory};
use crate::wal::{file_name, list_files, FILE_SUFFIX, SNAPSHOT_PREFIX, WAL_PREFIX};

const TEMP_SUFFIX: &str = ".tmp";

/// Result of a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointResult {
    pub snapshot_path: PathBuf,
    pub sequence: u64,
    pub live_entries: usize,
    pub snapshot_bytes: u64,
    /// WAL and snapshot files deleted after the snapshot became current
    pub removed_files: usize,
}

/// Write a snapshot of `entries` as `snap-{sequence}.log` in `wal_dir`.
///
/// Returns the final path, its size in bytes and the entry count.
pub fn write_snapshot<'a, I>(wal_dir: &Path, sequence: u64, entries: I) -> StoreResult<(PathBuf, u64, usize)>
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    let final_path = wal_dir.join(file_name(SNAPSHOT_PREFIX, sequence));
    let tmp_path = temp_path(&final_path);

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| StoreError::io_at(&tmp_path, e, "Failed to create snapshot file"))?;
    let mut writer = BufWriter::new(file);

    let mut bytes = 0u64;
    let mut count = 0usize;
    for (key, value) in entries {
        let record = serialize_entry(key, value, Operation::Put)?;
        writer
            .write_all(&record)
            .map_err(|e| StoreError::io_at(&tmp_path, e, "Failed to write snapshot entry"))?;
        bytes += record.len() as u64;
        count += 1;
    }

    let file = writer
        .into_inner()
        .map_err(|e| StoreError::io_at(&tmp_path, e.into_error(), "Failed to flush snapshot file"))?;
    durable_sync(&file).map_err(|e| StoreError::io_at(&tmp_path, e, "Snapshot durable_sync failed"))?;
    drop(file);

    fs::rename(&tmp_path, &final_path)
        .map_err(|e| StoreError::io_at(&final_path, e, "Failed to rename snapshot into place"))?;
    sync_directory(wal_dir).map_err(|e| StoreError::io_at(wal_dir, e, "Failed to sync WAL directory"))?;

    Ok((final_path, bytes, count))
}

fn temp_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Snapshot temp files left by an interrupted checkpoint.
fn orphaned_temp_files(wal_dir: &Path) -> StoreResult<Vec<PathBuf>> {
    let entries = fs::read_dir(wal_dir).map_err(|e| StoreError::io_at(wal_dir, e, "Failed to read WAL directory"))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io_at(wal_dir, e, "Failed to read directory entry"))?;
        let path = entry.path();
        let orphaned = path.file_name().and_then(|n| n.to_str()).is_some_and(|name| {
            name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(&format!("{}{}", FILE_SUFFIX, TEMP_SUFFIX))
        });
        if orphaned && path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn remove_all(wal_dir: &Path, paths: Vec<PathBuf>) -> StoreResult<usize> {
    let removed = paths.len();
    for path in paths {
        fs::remove_file(&path).map_err(|e| StoreError::io_at(&path, e, "Failed to remove obsolete file"))?;
    }
    if removed > 0 {
        sync_directory(wal_dir).map_err(|e| StoreError::io_at(wal_dir, e, "Failed to sync WAL directory"))?;
    }
    Ok(removed)
}

/// Delete WAL files at or below `sequence`, snapshots below it and
/// orphaned snapshot temp files.
///
/// Returns how many files were removed.
pub fn remove_obsolete(wal_dir: &Path, sequence: u64) -> StoreResult<usize> {
    let stale_wal = list_files(wal_dir, WAL_PREFIX)?
        .into_iter()
        .filter(|(seq, _)| *seq <= sequence);
    let stale_snapshots = list_files(wal_dir, SNAPSHOT_PREFIX)?
        .into_iter()
        .filter(|(seq, _)| *seq < sequence);

    let mut paths: Vec<PathBuf> = stale_wal.chain(stale_snapshots).map(|(_, path)| path).collect();
    paths.extend(orphaned_temp_files(wal_dir)?);
    remove_all(wal_dir, paths)
}

/// Delete empty WAL files and orphaned snapshot temp files.
///
/// Only safe before a WAL writer is opened on `wal_dir`: the writer's own
/// file is empty until its first append.
pub fn remove_stale(wal_dir: &Path) -> StoreResult<usize> {
    let mut paths = Vec::new();
    for (_, path) in list_files(wal_dir, WAL_PREFIX)? {
        let len = fs::metadata(&path)
            .map_err(|e| StoreError::io_at(&path, e, "Failed to stat WAL file"))?
            .len();
        if len == 0 && path.is_file() {
            paths.push(path);
        }
    }
    paths.extend(orphaned_temp_files(wal_dir)?);
    remove_all(wal_dir, paths)
}
