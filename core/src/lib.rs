//! toldyou Core Library
//!
//! Commit-then-prove timestamping of short texts. A message is hashed, salted
//! with a nonce, hashed again and submitted to a remote calendar server. The
//! resulting proof starts out pending and is later upgraded into a proof
//! anchored in a Bitcoin block header.

pub mod calendar;
pub mod certify;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod notary;
pub mod notify;
pub mod storage;
pub mod timestamp;
pub mod types;
pub mod version;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use calendar::{Calendar, RemoteCalendar, Submission};
pub use certify::Upgrade;
pub use config::Config;
pub use notary::{Certificate, Notary};
pub use notify::{ChannelNotifier, LogNotifier, Notifier, Verified};
pub use storage::{Record, RecordStore, Storage};
pub use timestamp::{Attestation, DetachedTimestampFile, HashAlgorithm, Op, Timestamp};
pub use types::*;
pub use version::version_string;
pub use worker::{PassSummary, UpgradeWorker, WorkerHandle};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Calendar transport failed: {0}")]
    Transport(String),

    #[error("Commitment not found on calendar")]
    CommitmentNotFound,

    #[error("Malformed proof: {0}")]
    MalformedProof(String),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
