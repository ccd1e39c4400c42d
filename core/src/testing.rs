//! In-process calendar used by unit tests

use crate::calendar::{Calendar, Submission};
use crate::timestamp::{Attestation, Op, Timestamp};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) const CALENDAR_URI: &str = "https://calendar.test";

/// Calendar whose answers are set up by the test
#[derive(Default)]
pub(crate) struct ScriptedCalendar {
    /// Answer submissions with a pending attestation instead of deferring
    pub immediate: bool,
    offline: AtomicBool,
    proofs: Mutex<HashMap<Vec<u8>, Timestamp>>,
    submitted: Mutex<Vec<Vec<u8>>>,
    fetches: AtomicUsize,
}

impl ScriptedCalendar {
    pub fn immediate() -> Self {
        Self {
            immediate: true,
            ..Default::default()
        }
    }

    pub fn deferred() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make a Bitcoin-anchored proof for `digest` available
    pub fn confirm(&self, digest: &[u8], height: u64) {
        let mut proof = Timestamp::new(digest.to_vec());
        proof
            .add_op(Op::Prepend(vec![0xde, 0xad, 0xbe, 0xef]))
            .unwrap()
            .add_op(Op::sha256())
            .unwrap()
            .add_attestation(Attestation::BitcoinBlockHeader { height });
        self.proofs.lock().unwrap().insert(digest.to_vec(), proof);
    }

    /// Make a proof available that is no better than pending
    pub fn publish_pending_only(&self, digest: &[u8]) {
        let mut proof = Timestamp::new(digest.to_vec());
        proof
            .add_op(Op::Append(vec![0x01]))
            .unwrap()
            .add_attestation(Attestation::Pending {
                uri: "https://other.test".to_string(),
            });
        self.proofs.lock().unwrap().insert(digest.to_vec(), proof);
    }

    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Calendar for ScriptedCalendar {
    fn url(&self) -> &str {
        CALENDAR_URI
    }

    async fn submit(&self, digest: &[u8]) -> Result<Submission> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Transport("calendar offline".to_string()));
        }
        self.submitted.lock().unwrap().push(digest.to_vec());
        if self.immediate {
            let mut proof = Timestamp::new(digest.to_vec());
            proof.add_attestation(Attestation::Pending {
                uri: CALENDAR_URI.to_string(),
            });
            Ok(Submission::Immediate(proof))
        } else {
            Ok(Submission::Deferred("queued".to_string()))
        }
    }

    async fn get_timestamp(&self, digest: &[u8]) -> Result<Timestamp> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Transport("calendar offline".to_string()));
        }
        self.proofs
            .lock()
            .unwrap()
            .get(digest)
            .cloned()
            .ok_or(Error::CommitmentNotFound)
    }
}
