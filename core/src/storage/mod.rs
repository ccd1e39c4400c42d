//! Storage module
//!
//! Persists timestamped records in RocksDB:
//! - Records by id (text, proof bytes, verification time)
//! - Per-user index ordered by creation time
//! - Index of records still waiting for a Bitcoin attestation

pub mod record;
pub mod records;

use crate::types::{RecordId, UserId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, DB};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub use record::Record;

/// Read/write contract the notary and the upgrade worker need from storage
pub trait RecordStore: Send + Sync {
    fn insert_record(
        &self,
        user_id: UserId,
        username: Option<&str>,
        created_at: DateTime<Utc>,
        text: &str,
        stamp: &[u8],
    ) -> Result<RecordId>;

    /// Oldest first
    fn find_records_by_user(&self, user_id: UserId) -> Result<Vec<Record>>;

    /// Every record without a verification time
    fn find_pending_records(&self) -> Result<Vec<Record>>;

    fn update_record_on_upgrade(
        &self,
        id: RecordId,
        verified_at: DateTime<Utc>,
        stamp: &[u8],
    ) -> Result<()>;

    /// Replace the proof of a record that is still pending. A verified
    /// record is left as it is.
    fn update_record_stamp(&self, id: RecordId, stamp: &[u8]) -> Result<()>;

    /// Returns how many records were removed
    fn delete_all_records_for_user(&self, user_id: UserId) -> Result<usize>;
}

/// Storage manager
pub struct Storage {
    /// RocksDB instance
    db: DB,

    /// Held by every read-modify-write of an existing record, so a bulk
    /// delete never interleaves with an update
    write_lock: Mutex<()>,
}

impl Storage {
    /// Column family names
    const CF_RECORDS: &'static str = "records";
    const CF_USER_RECORDS: &'static str = "user_records";
    const CF_PENDING: &'static str = "pending";

    /// Open storage at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db_path = path.as_ref().join("db");

        fs::create_dir_all(&db_path)
            .map_err(|e| Error::Storage(format!("Failed to create database directory: {}", e)))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(Self::CF_RECORDS, Options::default()),
            ColumnFamilyDescriptor::new(Self::CF_USER_RECORDS, Options::default()),
            ColumnFamilyDescriptor::new(Self::CF_PENDING, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, &db_path, cfs)
            .map_err(|e| Error::Storage(format!("Failed to open RocksDB: {}", e)))?;

        tracing::debug!(path = %db_path.display(), "Opened record storage");

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Missing {} column family", name)))
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| Error::Storage("Write lock poisoned".to_string()))
    }

    /// Close the database (explicit cleanup)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_initialization() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path())?;

        assert!(temp_dir.path().join("db").exists());
        for cf in [Storage::CF_RECORDS, Storage::CF_USER_RECORDS, Storage::CF_PENDING] {
            assert!(storage.cf(cf).is_ok());
        }

        storage.close()?;
        Ok(())
    }

    #[test]
    fn test_reopen_existing_storage() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        Storage::open(temp_dir.path())?.close()?;
        Storage::open(temp_dir.path())?.close()?;
        Ok(())
    }
}
