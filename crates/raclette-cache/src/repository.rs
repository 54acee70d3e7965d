//! Blob repository over the embedded store.
//!
//! Keys are UTF-8 strings stored as their bytes. Every operation logs its
//! outcome and returns errors to the caller.

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use raclette_store::{ReadOptions, Transaction, TransactionDb, WriteOptions};

use crate::config::StoreConfig;
use crate::error::{CacheError, CacheResult};

/// Keyed blob storage.
pub trait BlobRepository: Send + Sync {
    /// Store the full contents of `value` under `key`.
    fn save(&self, key: &str, value: &mut dyn Read) -> CacheResult<()>;

    /// Stored bytes for `key`, or `None` when absent.
    fn find(&self, key: &str) -> CacheResult<Option<Bytes>>;

    /// Remove `key`. Removing an absent key succeeds.
    fn delete(&self, key: &str) -> CacheResult<()>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `BlobRepository` backed by one long-lived store handle.
#[derive(Debug)]
pub struct StoreRepository {
    store: TransactionDb,
    overwrite_existing: bool,
    max_payload_bytes: u64,
}

impl StoreRepository {
    /// Open the store described by `config`. The directory stays locked
    /// until the repository is closed or dropped.
    pub fn open(config: &StoreConfig) -> CacheResult<Self> {
        let path = &config.database.path;
        let store = TransactionDb::open(path, &config.engine_options()).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "failed to open store");
            CacheError::from(e)
        })?;
        Ok(Self::new(store, config.overwrite_existing, config.max_payload_bytes))
    }

    pub fn new(store: TransactionDb, overwrite_existing: bool, max_payload_bytes: u64) -> Self {
        Self { store, overwrite_existing, max_payload_bytes }
    }

    pub fn overwrite_existing(&self) -> bool {
        self.overwrite_existing
    }

    pub fn max_payload_bytes(&self) -> u64 {
        self.max_payload_bytes
    }

    /// Save inside a read-committed transaction.
    ///
    /// The existence check and the write are not isolated from other
    /// writers: two concurrent saves of the same new key can both commit
    /// even with overwrite disabled, and the later commit wins.
    pub fn transactional_save(&self, key: &str, value: &mut dyn Read) -> CacheResult<()> {
        log_outcome("transactional_save", key, self.transactional_save_inner(key, value))
    }

    fn transactional_save_inner(&self, key: &str, value: &mut dyn Read) -> CacheResult<()> {
        let txn = self.begin_save(key)?;
        self.commit_save(txn, key, value)
    }

    /// Begin a transaction and run the overwrite check inside it.
    fn begin_save(&self, key: &str) -> CacheResult<Transaction> {
        let key_bytes = validate_key(key)?;
        let txn = self.store.begin_transaction(&WriteOptions::default());
        if !self.overwrite_existing && txn.get(&ReadOptions::default(), key_bytes)?.is_some() {
            return Err(CacheError::KeyConflict { key: key.to_string() });
        }
        Ok(txn)
    }

    fn commit_save(&self, mut txn: Transaction, key: &str, value: &mut dyn Read) -> CacheResult<()> {
        let payload = read_payload(value, self.max_payload_bytes)?;
        txn.put(key.as_bytes(), &payload)?;
        txn.commit()?;
        tracing::info!(key, bytes = payload.len(), "entry saved in transaction");
        Ok(())
    }

    fn save_inner(&self, key: &str, value: &mut dyn Read) -> CacheResult<()> {
        let key_bytes = validate_key(key)?;
        let db = self.store.db();
        // The probe can give false positives, so confirm before rejecting
        if !self.overwrite_existing && db.may_exist(key_bytes) && db.get(key_bytes)?.is_some() {
            return Err(CacheError::KeyConflict { key: key.to_string() });
        }
        let payload = read_payload(value, self.max_payload_bytes)?;
        db.put(key_bytes, &payload)?;
        tracing::info!(key, bytes = payload.len(), "entry saved");
        Ok(())
    }

    fn find_inner(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let key_bytes = validate_key(key)?;
        let found = self.store.db().get(key_bytes)?;
        match &found {
            Some(value) => tracing::info!(key, bytes = value.len(), "entry found"),
            None => tracing::debug!(key, "entry not found"),
        }
        Ok(found.map(Bytes::from))
    }

    fn delete_inner(&self, key: &str) -> CacheResult<()> {
        let key_bytes = validate_key(key)?;
        self.store.db().delete(key_bytes)?;
        tracing::info!(key, "entry deleted");
        Ok(())
    }

    /// Checkpoint the store and release it.
    pub fn close(self) -> CacheResult<()> {
        let db = self.store.into_db();
        db.checkpoint()?;
        match Arc::try_unwrap(db) {
            Ok(db) => db.close()?,
            Err(_) => tracing::warn!("store still shared at close, lock released when the last handle drops"),
        }
        tracing::info!("repository closed");
        Ok(())
    }
}

impl BlobRepository for StoreRepository {
    fn save(&self, key: &str, value: &mut dyn Read) -> CacheResult<()> {
        log_outcome("save", key, self.save_inner(key, value))
    }

    fn find(&self, key: &str) -> CacheResult<Option<Bytes>> {
        log_outcome("find", key, self.find_inner(key))
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        log_outcome("delete", key, self.delete_inner(key))
    }

    fn len(&self) -> usize {
        self.store.db().len()
    }
}

fn validate_key(key: &str) -> CacheResult<&[u8]> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey);
    }
    Ok(key.as_bytes())
}

/// Read all of `value`, failing once more than `limit` bytes arrive.
fn read_payload<R: Read>(value: R, limit: u64) -> CacheResult<Vec<u8>> {
    let mut buffer = Vec::new();
    value.take(limit.saturating_add(1)).read_to_end(&mut buffer)?;
    let size = buffer.len() as u64;
    if size > limit {
        return Err(CacheError::PayloadTooLarge { size, limit });
    }
    Ok(buffer)
}

fn log_outcome<T>(operation: &'static str, key: &str, result: CacheResult<T>) -> CacheResult<T> {
    if let Err(e) = &result {
        if e.is_client_error() {
            tracing::warn!(operation, key, error = %e, "request rejected");
        } else {
            let cause = std::error::Error::source(e).map(|s| s.to_string());
            tracing::error!(operation, key, error = %e, cause = ?cause, "store operation failed");
        }
    }
    result
}
