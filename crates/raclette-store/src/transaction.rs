//! Transactions: `TransactionDb` and `Transaction`.
//!
//! A transaction buffers its writes and applies them to the store as one
//! atomic batch on commit. Reads see committed data at the time of each
//! read (read committed), plus the transaction's own pending writes. Keys
//! are not locked: two transactions that read the same key and then write
//! it both commit, and the later commit wins.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::batch::WriteBatch;
use crate::db::Db;
use crate::error::StoreResult;
use crate::options::{Options, ReadOptions, WriteOptions};

/// Store handle that can begin transactions.
#[derive(Debug, Clone)]
pub struct TransactionDb {
    db: Arc<Db>,
}

impl TransactionDb {
    pub fn open<P: AsRef<Path>>(path: P, options: &Options) -> StoreResult<Self> {
        Ok(Self { db: Arc::new(Db::open(path, options)?) })
    }

    /// Non-transactional access to the same store.
    pub fn db(&self) -> &Arc<Db> {
        &self.db
    }

    pub fn into_db(self) -> Arc<Db> {
        self.db
    }

    pub fn begin_transaction(&self, write_options: &WriteOptions) -> Transaction {
        Transaction {
            db: Arc::clone(&self.db),
            write_options: *write_options,
            pending: BTreeMap::new(),
            batch: WriteBatch::new(),
        }
    }
}

/// Read-write transaction.
///
/// Nothing reaches the store until `commit`. Dropping the transaction
/// without committing discards its writes.
pub struct Transaction {
    db: Arc<Db>,
    write_options: WriteOptions,
    /// Latest pending state per key; `None` is a pending delete
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    batch: WriteBatch,
}

impl Transaction {
    /// Read `key` as of now.
    ///
    /// With `read_own_writes` set, a key this transaction has written
    /// returns the pending value instead of the committed one.
    pub fn get(&self, read_options: &ReadOptions, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        if read_options.read_own_writes {
            if let Some(pending) = self.pending.get(key) {
                return Ok(pending.clone());
            }
        }
        self.db.get(key)
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.batch.put(key, value);
        self.pending.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.batch.delete(key);
        self.pending.insert(key.to_vec(), None);
        Ok(())
    }

    /// Number of buffered write operations.
    pub fn pending_writes(&self) -> usize {
        self.batch.len()
    }

    /// Apply every buffered write atomically.
    pub fn commit(mut self) -> StoreResult<()> {
        let batch = std::mem::take(&mut self.batch);
        self.pending.clear();
        let ops = batch.len();
        self.db.write(&self.write_options, batch)?;
        tracing::trace!(ops, "transaction committed");
        Ok(())
    }

    /// Discard every buffered write.
    pub fn rollback(mut self) {
        self.batch.clear();
        self.pending.clear();
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.batch.is_empty() {
            tracing::debug!(ops = self.batch.len(), "transaction dropped without commit, writes discarded");
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction").field("pending_writes", &self.batch.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_txn_db() -> (TransactionDb, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = TransactionDb::open(dir.path(), &Options::default().set_create_if_missing(true)).unwrap();
        (db, dir)
    }

    #[test]
    fn test_commit_applies_writes() {
        let (txn_db, _dir) = test_txn_db();
        let mut txn = txn_db.begin_transaction(&WriteOptions::default());
        txn.put(b"a", b"1").unwrap();
        txn.put(b"b", b"2").unwrap();
        assert_eq!(txn.pending_writes(), 2);

        // Not visible outside before commit
        assert_eq!(txn_db.db().get(b"a").unwrap(), None);

        txn.commit().unwrap();
        assert_eq!(txn_db.db().get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(txn_db.db().get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let (txn_db, _dir) = test_txn_db();
        let mut txn = txn_db.begin_transaction(&WriteOptions::default());
        txn.put(b"a", b"1").unwrap();
        txn.rollback();
        assert_eq!(txn_db.db().get(b"a").unwrap(), None);
    }

    #[test]
    fn test_drop_without_commit_discards_writes() {
        let (txn_db, _dir) = test_txn_db();
        {
            let mut txn = txn_db.begin_transaction(&WriteOptions::default());
            txn.put(b"a", b"1").unwrap();
        }
        assert!(txn_db.db().is_empty());
    }

    #[test]
    fn test_read_own_writes() {
        let (txn_db, _dir) = test_txn_db();
        txn_db.db().put(b"k", b"committed").unwrap();

        let mut txn = txn_db.begin_transaction(&WriteOptions::default());
        txn.put(b"k", b"pending").unwrap();
        assert_eq!(txn.get(&ReadOptions::default(), b"k").unwrap(), Some(b"pending".to_vec()));

        let committed_only = ReadOptions { read_own_writes: false };
        assert_eq!(txn.get(&committed_only, b"k").unwrap(), Some(b"committed".to_vec()));

        txn.delete(b"k").unwrap();
        assert_eq!(txn.get(&ReadOptions::default(), b"k").unwrap(), None);
    }

    #[test]
    fn test_reads_see_later_commits() {
        let (txn_db, _dir) = test_txn_db();
        let txn = txn_db.begin_transaction(&WriteOptions::default());
        assert_eq!(txn.get(&ReadOptions::default(), b"k").unwrap(), None);

        txn_db.db().put(b"k", b"v").unwrap();
        assert_eq!(txn.get(&ReadOptions::default(), b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_lost_update_last_commit_wins() {
        let (txn_db, _dir) = test_txn_db();
        let ro = ReadOptions::default();

        let mut t1 = txn_db.begin_transaction(&WriteOptions::default());
        let mut t2 = txn_db.begin_transaction(&WriteOptions::default());

        // Both observe absence, both write, both commit
        assert_eq!(t1.get(&ro, b"k").unwrap(), None);
        assert_eq!(t2.get(&ro, b"k").unwrap(), None);
        t1.put(b"k", b"v1").unwrap();
        t2.put(b"k", b"v2").unwrap();

        t1.commit().unwrap();
        t2.commit().unwrap();
        assert_eq!(txn_db.db().get(b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn test_commit_is_durable() {
        let dir = TempDir::new().unwrap();
        let opts = Options::default().set_create_if_missing(true);
        {
            let txn_db = TransactionDb::open(dir.path(), &opts).unwrap();
            let mut txn = txn_db.begin_transaction(&WriteOptions::default());
            txn.put(b"a", b"1").unwrap();
            txn.delete(b"a").unwrap();
            txn.put(b"b", b"2").unwrap();
            txn.commit().unwrap();
        }
        let db = Db::open(dir.path(), &opts).unwrap();
        assert_eq!(db.get(b"a").unwrap(), None);
        assert_eq!(db.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_empty_commit() {
        let (txn_db, _dir) = test_txn_db();
        let txn = txn_db.begin_transaction(&WriteOptions::default());
        txn.commit().unwrap();
        assert!(txn_db.db().is_empty());
    }
}
