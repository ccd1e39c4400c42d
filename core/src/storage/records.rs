//! Record persistence and indexing
//!
//! Key formats:
//! - records:      `<record_id>` -> bincode(Record)
//! - user_records: `<user_id be64><created_secs be64><created_nanos be32><record_id>` -> empty
//! - pending:      `<record_id>` -> empty

use super::{Record, RecordStore, Storage};
use crate::types::{RecordId, UserId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rocksdb::{Direction, IteratorMode, WriteBatch};

impl Storage {
    fn user_key(record: &Record) -> Vec<u8> {
        let mut key = Vec::with_capacity(36);
        key.extend_from_slice(&record.user_id.key_prefix());
        key.extend_from_slice(&(record.created_at.timestamp().max(0) as u64).to_be_bytes());
        key.extend_from_slice(&record.created_at.timestamp_subsec_nanos().to_be_bytes());
        key.extend_from_slice(record.id.as_bytes());
        key
    }

    fn encode_record(record: &Record) -> Result<Vec<u8>> {
        bincode::serialize(record)
            .map_err(|e| Error::Serialization(format!("Failed to encode record: {}", e)))
    }

    fn decode_record(bytes: &[u8]) -> Result<Record> {
        bincode::deserialize(bytes)
            .map_err(|e| Error::Serialization(format!("Failed to decode record: {}", e)))
    }

    /// Get a record by id
    pub fn get_record(&self, id: RecordId) -> Result<Option<Record>> {
        let cf = self.cf(Self::CF_RECORDS)?;
        match self.db.get_cf(cf, id.as_bytes()) {
            Ok(Some(bytes)) => Ok(Some(Self::decode_record(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to get record: {}", e))),
        }
    }

    /// Record ids from a column family, optionally restricted to a key prefix.
    /// The id is always the last 16 bytes of the key.
    fn scan_ids(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<RecordId>> {
        let cf = self.cf(cf_name)?;
        let mut ids = Vec::new();

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, _) = item.map_err(|e| Error::Storage(format!("Iterator error: {}", e)))?;

            if !key.starts_with(prefix) {
                break;
            }
            if key.len() < 16 {
                return Err(Error::Storage(format!(
                    "Corrupt {} key of {} bytes",
                    cf_name,
                    key.len()
                )));
            }

            let id = RecordId::from_slice(&key[key.len() - 16..])
                .map_err(|e| Error::Storage(format!("Corrupt record id: {}", e)))?;
            ids.push(id);
        }

        Ok(ids)
    }

    fn load_records(&self, ids: Vec<RecordId>) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_record(id)? {
                Some(record) => records.push(record),
                None => tracing::warn!(record_id = %id, "Index points at missing record"),
            }
        }
        Ok(records)
    }
}

impl RecordStore for Storage {
    fn insert_record(
        &self,
        user_id: UserId,
        username: Option<&str>,
        created_at: DateTime<Utc>,
        text: &str,
        stamp: &[u8],
    ) -> Result<RecordId> {
        let record = Record {
            id: RecordId::new(),
            user_id,
            username: username.map(str::to_string),
            created_at,
            text: text.to_string(),
            stamp: stamp.to_vec(),
            verified_at: None,
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(Self::CF_RECORDS)?, record.id.as_bytes(), Self::encode_record(&record)?);
        batch.put_cf(self.cf(Self::CF_USER_RECORDS)?, Self::user_key(&record), b"");
        batch.put_cf(self.cf(Self::CF_PENDING)?, record.id.as_bytes(), b"");

        self.db
            .write(batch)
            .map_err(|e| Error::Storage(format!("Failed to insert record: {}", e)))?;

        tracing::debug!(record_id = %record.id, user_id = %user_id, "Stored record");
        Ok(record.id)
    }

    fn find_records_by_user(&self, user_id: UserId) -> Result<Vec<Record>> {
        let ids = self.scan_ids(Self::CF_USER_RECORDS, &user_id.key_prefix())?;
        self.load_records(ids)
    }

    fn find_pending_records(&self) -> Result<Vec<Record>> {
        let ids = self.scan_ids(Self::CF_PENDING, &[])?;
        self.load_records(ids)
    }

    fn update_record_on_upgrade(
        &self,
        id: RecordId,
        verified_at: DateTime<Utc>,
        stamp: &[u8],
    ) -> Result<()> {
        let _guard = self.lock_writes()?;
        let mut record = self.get_record(id)?.ok_or(Error::RecordNotFound(id))?;
        record.verified_at = Some(verified_at);
        record.stamp = stamp.to_vec();

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(Self::CF_RECORDS)?, id.as_bytes(), Self::encode_record(&record)?);
        batch.delete_cf(self.cf(Self::CF_PENDING)?, id.as_bytes());

        self.db
            .write(batch)
            .map_err(|e| Error::Storage(format!("Failed to update record: {}", e)))?;

        tracing::debug!(record_id = %id, "Marked record verified");
        Ok(())
    }

    fn update_record_stamp(&self, id: RecordId, stamp: &[u8]) -> Result<()> {
        let _guard = self.lock_writes()?;
        let mut record = self.get_record(id)?.ok_or(Error::RecordNotFound(id))?;
        if record.is_verified() {
            tracing::debug!(record_id = %id, "Record already verified, keeping its proof");
            return Ok(());
        }
        record.stamp = stamp.to_vec();

        self.db
            .put_cf(self.cf(Self::CF_RECORDS)?, id.as_bytes(), Self::encode_record(&record)?)
            .map_err(|e| Error::Storage(format!("Failed to update record: {}", e)))?;

        tracing::debug!(record_id = %id, "Replaced pending proof");
        Ok(())
    }

    fn delete_all_records_for_user(&self, user_id: UserId) -> Result<usize> {
        let _guard = self.lock_writes()?;
        let prefix = user_id.key_prefix();
        let cf_user = self.cf(Self::CF_USER_RECORDS)?;

        let mut user_keys = Vec::new();
        for item in self
            .db
            .iterator_cf(cf_user, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(|e| Error::Storage(format!("Iterator error: {}", e)))?;
            if !key.starts_with(&prefix) {
                break;
            }
            user_keys.push(key);
        }

        let mut batch = WriteBatch::default();
        for key in &user_keys {
            let id = &key[key.len().saturating_sub(16)..];
            batch.delete_cf(self.cf(Self::CF_RECORDS)?, id);
            batch.delete_cf(self.cf(Self::CF_PENDING)?, id);
            batch.delete_cf(cf_user, key);
        }

        self.db
            .write(batch)
            .map_err(|e| Error::Storage(format!("Failed to delete records: {}", e)))?;

        tracing::info!(user_id = %user_id, count = user_keys.len(), "Deleted user records");
        Ok(user_keys.len())
    }
}
