//! Certificate life cycle: commitment generation and upgrade
//!
//! `generate` never fails: whatever the calendar does, the caller gets a
//! storable proof. `upgrade` is safe to poll: it only changes the proof when
//! the calendar hands back a Bitcoin-anchored one.

use crate::calendar::{Calendar, Submission};
use crate::crypto::{self, NONCE_LEN};
use crate::timestamp::{DetachedTimestampFile, Op, Timestamp};
use crate::{Error, Result};
use tracing::{debug, error, info, warn};

/// Commit to `message` and submit the commitment to `calendar`.
///
/// The tree is `sha256(message) -> append(nonce) -> sha256`; the last value
/// is what the calendar sees, so it learns neither the digest nor the nonce.
pub async fn generate(message: &[u8], calendar: &dyn Calendar) -> DetachedTimestampFile {
    generate_with_nonce(message, crypto::fresh_nonce(), calendar).await
}

/// [`generate`] with a caller-chosen nonce
pub async fn generate_with_nonce(
    message: &[u8],
    nonce: [u8; NONCE_LEN],
    calendar: &dyn Calendar,
) -> DetachedTimestampFile {
    let mut file = DetachedTimestampFile::from_message(message);

    let chain = file
        .timestamp
        .add_op(Op::Append(nonce.to_vec()))
        .and_then(|salted| salted.add_op(Op::sha256()));

    match chain {
        Ok(commitment) => submit_commitment(commitment, calendar).await,
        Err(e) => error!(error = %e, "Failed to build commitment chain"),
    }

    file
}

/// Submit `node`'s value and merge whatever comes back. Failures are logged,
/// never raised; the node simply stays unattested.
async fn submit_commitment(node: &mut Timestamp, calendar: &dyn Calendar) {
    let commitment = node.msg().to_vec();

    match calendar.submit(&commitment).await {
        Ok(Submission::Immediate(proof)) => {
            if let Err(e) = node.merge(proof) {
                warn!(calendar = calendar.url(), error = %e, "Discarding calendar response");
            }
        }
        Ok(Submission::Deferred(token)) => {
            debug!(calendar = calendar.url(), token = %token, "Submission deferred");
        }
        Err(e) => {
            warn!(
                calendar = calendar.url(),
                commitment = %hex::encode(&commitment),
                error = %e,
                "Calendar submission failed"
            );
        }
    }
}

/// What an [`upgrade`] call did to the proof
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upgrade {
    /// A Bitcoin attestation was merged in
    Verified,

    /// A resubmitted commitment got a pending attestation. The proof changed
    /// and must be stored, but it is not verified yet.
    Attested,

    /// The proof is byte-identical to what it was
    Unchanged,
}

/// Upgrade `file` in place to a Bitcoin-anchored proof if the calendar has
/// one.
///
/// Only a [`Error::MalformedProof`] (the calendar's answer does not fit the
/// tree) is returned as an error; a missing commitment, a transport failure
/// or an answer that is still only pending leave the proof as it was.
pub async fn upgrade(file: &mut DetachedTimestampFile, calendar: &dyn Calendar) -> Result<Upgrade> {
    let timestamp = &mut file.timestamp;
    let mut attested = false;

    if timestamp.frontier().is_none() {
        // The first submission never got through; retry it
        if let Some(leaf) = timestamp.leaf_mut() {
            submit_commitment(leaf, calendar).await;
        }
        if timestamp.is_verified() {
            info!(calendar = calendar.url(), "Resubmission returned a Bitcoin attestation");
            return Ok(Upgrade::Verified);
        }
        attested = timestamp.frontier().is_some();
    }
    let unverified = if attested {
        Upgrade::Attested
    } else {
        Upgrade::Unchanged
    };

    let commitment = match timestamp.frontier() {
        None => {
            debug!("Proof has no attestation yet");
            return Ok(Upgrade::Unchanged);
        }
        Some(frontier) if frontier.has_bitcoin_attestation() => {
            debug!("Already Bitcoin verified");
            return Ok(Upgrade::Unchanged);
        }
        Some(frontier) => frontier.msg().to_vec(),
    };

    let upgraded = match calendar.get_timestamp(&commitment).await {
        Ok(proof) => proof,
        Err(Error::CommitmentNotFound) => {
            debug!(commitment = %hex::encode(&commitment), "Still not Bitcoin verified");
            return Ok(unverified);
        }
        Err(Error::Transport(e)) => {
            warn!(calendar = calendar.url(), error = %e, "Calendar unreachable during upgrade");
            return Ok(unverified);
        }
        Err(e) => return Err(e),
    };

    let anchored = upgraded
        .frontier()
        .map_or(false, Timestamp::has_bitcoin_attestation);
    if !anchored {
        debug!(commitment = %hex::encode(&commitment), "Calendar proof is not Bitcoin anchored yet");
        return Ok(unverified);
    }

    match timestamp.frontier_mut() {
        Some(frontier) => frontier.merge(upgraded)?,
        None => return Ok(unverified),
    }

    info!(commitment = %hex::encode(&commitment), "Proof upgraded to Bitcoin attestation");
    Ok(Upgrade::Verified)
}
