//! Stored record: a text, when it was stored, and its proof

use crate::types::{RecordId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display format for record timestamps
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub user_id: UserId,
    /// Display name at the time of storing, if the front end knows one
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub text: String,
    /// Serialized `DetachedTimestampFile`
    pub stamp: Vec<u8>,
    /// Set once the proof carries a Bitcoin attestation
    pub verified_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }

    pub fn created_display(&self) -> String {
        self.created_at.format(DATETIME_FORMAT).to_string()
    }
}
