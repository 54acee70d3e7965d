//! Platform-specific durability and locking primitives
//!
//! `durable_sync` maps to the strongest data sync each OS offers.
//! `DirLock` holds an exclusive advisory lock on a store's `LOCK` file so
//! only one handle can open a directory at a time.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};

/// Name of the lock file inside a store directory
pub const LOCK_FILE: &str = "LOCK";

/// Ensures file data is on persistent storage before returning.
///
/// - Linux: fdatasync()
/// - macOS/iOS: fcntl(F_FULLFSYNC), plain fsync stops at the drive cache
/// - Windows: FlushFileBuffers()
/// - Other: File::sync_data()
///
/// May block for a long time under heavy I/O; do not call while holding
/// the memtable write lock.
pub fn durable_sync(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the fd comes from a live File reference.
        let result = unsafe { libc::fdatasync(file.as_raw_fd()) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the fd comes from a live File reference.
        let result = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_FULLFSYNC) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::FlushFileBuffers;
        // SAFETY: the handle comes from a live File reference.
        let result = unsafe { FlushFileBuffers(file.as_raw_handle() as *mut _) };
        if result != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios", target_os = "windows")))]
    {
        file.sync_data()
    }
}

/// Sync a directory so renames and unlinks inside it survive power loss.
///
/// Directories cannot be opened for syncing on Windows; there the rename
/// itself is treated as durable.
pub fn sync_directory(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        let handle = File::open(dir)?;
        handle.sync_all()
    }

    #[cfg(not(unix))]
    {
        let _ = dir;
        Ok(())
    }
}

/// Exclusive lock on a store directory, released on drop.
#[derive(Debug)]
pub struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Take the lock on `dir/LOCK` without blocking.
    ///
    /// Fails with `StoreError::Locked` if another handle, in this process
    /// or another, already holds it.
    pub fn acquire(dir: &Path) -> StoreResult<Self> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StoreError::io_at(&path, e, "Failed to open lock file"))?;

        try_lock_exclusive(&file, &path).map_err(|e| {
            if e.kind() == io::ErrorKind::WouldBlock {
                StoreError::Locked { path: dir.to_path_buf() }
            } else {
                StoreError::io_at(&path, e, "Failed to lock store directory")
            }
        })?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        unlock(&self.file, &self.path);
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File, _path: &Path) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the fd comes from a live File reference.
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Err(io::Error::new(io::ErrorKind::WouldBlock, err))
    } else {
        Err(err)
    }
}

#[cfg(unix)]
fn unlock(file: &File, _path: &Path) {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the fd comes from a live File reference.
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

// No flock here: only handles inside this process are excluded.
#[cfg(not(unix))]
static HELD_LOCKS: parking_lot::Mutex<Vec<PathBuf>> = parking_lot::const_mutex(Vec::new());

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File, path: &Path) -> io::Result<()> {
    let mut held = HELD_LOCKS.lock();
    if held.iter().any(|p| p == path) {
        return Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"));
    }
    held.push(path.to_path_buf());
    Ok(())
}

#[cfg(not(unix))]
fn unlock(_file: &File, path: &Path) {
    HELD_LOCKS.lock().retain(|p| p != path);
}
