//! Integration tests: full open -> write -> close -> reopen cycles.

use std::fs::OpenOptions;
use std::io::Write;

use raclette_store::db::WAL_DIR;
use raclette_store::wal::{list_files, WAL_PREFIX};
use raclette_store::{Db, Options, ReadOptions, StoreError, TransactionDb, WriteBatch, WriteOptions};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn create_opts() -> Options {
    Options::default().set_create_if_missing(true)
}

// ---------------------------------------------------------------------------
// Open semantics
// ---------------------------------------------------------------------------

#[test]
fn test_create_then_reopen_without_create() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store");

    assert!(matches!(Db::open(&path, &Options::default()), Err(StoreError::NotFound { .. })));

    Db::open(&path, &create_opts()).unwrap().close().unwrap();
    let db = Db::open(&path, &Options::default()).unwrap();
    assert!(db.is_empty());
}

#[test]
fn test_lock_released_between_handles() {
    let dir = TempDir::new().unwrap();
    let first = TransactionDb::open(dir.path(), &create_opts()).unwrap();

    let err = Db::open(dir.path(), &create_opts()).unwrap_err();
    assert!(matches!(err, StoreError::Locked { .. }));
    assert!(err.to_string().contains("locked"));

    drop(first);
    Db::open(dir.path(), &create_opts()).unwrap();
}

// ---------------------------------------------------------------------------
// Durability
// ---------------------------------------------------------------------------

#[test]
fn test_many_cycles_keep_latest_values() {
    let dir = TempDir::new().unwrap();
    for round in 0..5u8 {
        let db = Db::open(dir.path(), &create_opts()).unwrap();
        if round > 0 {
            assert_eq!(db.get(b"round").unwrap(), Some(vec![round - 1]));
        }
        db.put(b"round", &[round]).unwrap();
        if round % 2 == 0 {
            db.checkpoint().unwrap();
        }
        db.close().unwrap();
    }
}

#[test]
fn test_torn_tail_is_dropped() {
    let dir = TempDir::new().unwrap();
    {
        let db = Db::open(dir.path(), &create_opts()).unwrap();
        db.put(b"whole", b"entry").unwrap();
    }

    // Simulate a crash mid-append: half a header at the end of the log
    let wal_files = list_files(&dir.path().join(WAL_DIR), WAL_PREFIX).unwrap();
    let (_, last) = wal_files.last().unwrap();
    let mut file = OpenOptions::new().append(true).open(last).unwrap();
    file.write_all(b"RCLT\x10\x00").unwrap();
    drop(file);

    let db = Db::open(dir.path(), &create_opts()).unwrap();
    assert_eq!(db.get(b"whole").unwrap(), Some(b"entry".to_vec()));
    assert_eq!(db.len(), 1);

    // New writes after recovery are still readable on the next open
    db.put(b"after", b"crash").unwrap();
    drop(db);
    let db = Db::open(dir.path(), &create_opts()).unwrap();
    assert_eq!(db.get(b"after").unwrap(), Some(b"crash".to_vec()));
}

#[test]
fn test_idle_reopens_drop_empty_wal_files() {
    let dir = TempDir::new().unwrap();
    let wal_dir = dir.path().join(WAL_DIR);
    {
        let db = Db::open(dir.path(), &create_opts()).unwrap();
        db.put(b"k", b"v").unwrap();
    }
    for _ in 0..4 {
        Db::open(dir.path(), &create_opts()).unwrap().close().unwrap();
    }
    std::fs::write(wal_dir.join("snap-0000000000000009.log.tmp"), b"partial").unwrap();

    let db = Db::open(dir.path(), &create_opts()).unwrap();
    assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));

    // The written file plus the current one; empty files and the temp file are gone
    let wal_files = list_files(&wal_dir, WAL_PREFIX).unwrap();
    assert_eq!(wal_files.len(), 2);
    assert!(!wal_dir.join("snap-0000000000000009.log.tmp").exists());
}

#[test]
fn test_transaction_and_plain_writes_interleave() {
    let dir = TempDir::new().unwrap();
    {
        let txn_db = TransactionDb::open(dir.path(), &create_opts()).unwrap();
        txn_db.db().put(b"plain", b"1").unwrap();

        let mut txn = txn_db.begin_transaction(&WriteOptions::default());
        assert_eq!(txn.get(&ReadOptions::default(), b"plain").unwrap(), Some(b"1".to_vec()));
        txn.put(b"txn", b"2").unwrap();
        txn.delete(b"plain").unwrap();
        txn.commit().unwrap();

        let mut batch = WriteBatch::new();
        batch.put(b"batch", b"3");
        txn_db.db().write(&WriteOptions::default(), batch).unwrap();
    }
    let db = Db::open(dir.path(), &create_opts()).unwrap();
    assert_eq!(db.get(b"plain").unwrap(), None);
    assert_eq!(db.get(b"txn").unwrap(), Some(b"2".to_vec()));
    assert_eq!(db.get(b"batch").unwrap(), Some(b"3".to_vec()));
}

#[test]
fn test_binary_keys_and_empty_values() {
    let dir = TempDir::new().unwrap();
    let key = [0u8, 255, 1, 254];
    {
        let db = Db::open(dir.path(), &create_opts()).unwrap();
        db.put(&key, b"").unwrap();
    }
    let db = Db::open(dir.path(), &create_opts()).unwrap();
    assert_eq!(db.get(&key).unwrap(), Some(Vec::new()));
}
