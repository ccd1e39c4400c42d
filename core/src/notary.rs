//! Notary service
//!
//! Ties the certificate life cycle to the record store: stores phrases with a
//! fresh proof, lists them (upgrading pending proofs on the way), and renders
//! the public verification link once a proof is Bitcoin anchored.

use crate::calendar::Calendar;
use crate::certify::{self, Upgrade};
use crate::codec;
use crate::storage::{Record, RecordStore};
use crate::types::{RecordId, UserId};
use crate::Result;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Public link for a serialized proof: `base` followed by the lowercase hex
/// of the proof bytes.
pub fn verification_link(base: &str, proof: &[u8]) -> String {
    format!("{}{}", base, hex::encode(proof))
}

/// What a user gets to see about a record's proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Certificate {
    Verified(String),
    Pending,
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Certificate::Verified(link) => write!(f, "Blockchain certificate: {}", link),
            Certificate::Pending => write!(f, "Blockchain verification is pending"),
        }
    }
}

pub struct Notary {
    store: Arc<dyn RecordStore>,
    calendar: Arc<dyn Calendar>,
    verify_base_url: String,
}

impl Notary {
    pub fn new(
        store: Arc<dyn RecordStore>,
        calendar: Arc<dyn Calendar>,
        verify_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            calendar,
            verify_base_url: verify_base_url.into(),
        }
    }

    /// Timestamp `text` and store it for `user_id`.
    ///
    /// Succeeds even when the calendar is unreachable; the stored proof is
    /// then unattested and gets resubmitted on the next upgrade.
    pub async fn store_phrase(
        &self,
        user_id: UserId,
        username: Option<&str>,
        text: &str,
    ) -> Result<RecordId> {
        let file = certify::generate(text.as_bytes(), self.calendar.as_ref()).await;
        let stamp = codec::serialize(&file);

        let id = self
            .store
            .insert_record(user_id, username, Utc::now(), text, &stamp)?;

        info!(record_id = %id, user_id = %user_id, "Stored phrase");
        Ok(id)
    }

    /// All records of `user_id`, oldest first. Pending records are upgraded
    /// first; a record that fails to upgrade is returned as it was.
    pub async fn records_for_user(&self, user_id: UserId) -> Result<Vec<Record>> {
        let mut records = self.store.find_records_by_user(user_id)?;

        for record in records.iter_mut().filter(|r| !r.is_verified()) {
            if let Err(e) = self.upgrade_record(record).await {
                warn!(record_id = %record.id, error = %e, "Upgrade on read failed");
            }
        }

        Ok(records)
    }

    /// Records still waiting for a Bitcoin attestation
    pub fn pending_records(&self) -> Result<Vec<Record>> {
        self.store.find_pending_records()
    }

    /// Try to upgrade one record's proof and report whether it is now
    /// Bitcoin verified. Any change to the proof is persisted and written
    /// back into `record`; the verification time is only set once verified.
    pub async fn upgrade_record(&self, record: &mut Record) -> Result<bool> {
        if record.is_verified() {
            return Ok(false);
        }

        let mut file = codec::deserialize(&record.stamp)?;

        match certify::upgrade(&mut file, self.calendar.as_ref()).await? {
            Upgrade::Unchanged => {
                debug!(record_id = %record.id, "Record still pending");
                Ok(false)
            }
            Upgrade::Attested => {
                let stamp = codec::serialize(&file);
                self.store.update_record_stamp(record.id, &stamp)?;
                record.stamp = stamp;

                info!(record_id = %record.id, "Calendar acknowledged resubmitted commitment");
                Ok(false)
            }
            Upgrade::Verified => {
                let stamp = codec::serialize(&file);
                let verified_at = Utc::now();
                self.store
                    .update_record_on_upgrade(record.id, verified_at, &stamp)?;

                record.stamp = stamp;
                record.verified_at = Some(verified_at);

                info!(record_id = %record.id, "Record verified");
                Ok(true)
            }
        }
    }

    pub fn delete_all(&self, user_id: UserId) -> Result<usize> {
        self.store.delete_all_records_for_user(user_id)
    }

    pub fn link(&self, record: &Record) -> String {
        verification_link(&self.verify_base_url, &record.stamp)
    }

    pub fn certificate(&self, record: &Record) -> Certificate {
        if record.is_verified() {
            Certificate::Verified(self.link(record))
        } else {
            Certificate::Pending
        }
    }
}
