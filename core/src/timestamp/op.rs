//! Deterministic byte transformations along a commitment chain

use crate::crypto;
use crate::{Error, Result};
use std::fmt;

/// Largest value any node of a proof may hold
pub const MAX_MSG_LENGTH: usize = 4096;

/// Largest append/prepend payload accepted
pub const MAX_OP_PAYLOAD: usize = 4096;

/// Hash algorithms usable as an operation
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum HashAlgorithm {
    Sha256,
}

impl HashAlgorithm {
    pub fn digest(&self, msg: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => crypto::sha256(msg).to_vec(),
        }
    }

    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

/// A single edge of the operation tree.
///
/// Variant order matches tag order, so the derived `Ord` is also the
/// canonical serialization order.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Op {
    Hash(HashAlgorithm),
    Append(Vec<u8>),
    Prepend(Vec<u8>),
}

impl Op {
    pub const TAG_SHA256: u8 = 0x08;
    pub const TAG_APPEND: u8 = 0xf0;
    pub const TAG_PREPEND: u8 = 0xf1;

    pub fn sha256() -> Self {
        Op::Hash(HashAlgorithm::Sha256)
    }

    pub fn tag(&self) -> u8 {
        match self {
            Op::Hash(HashAlgorithm::Sha256) => Self::TAG_SHA256,
            Op::Append(_) => Self::TAG_APPEND,
            Op::Prepend(_) => Self::TAG_PREPEND,
        }
    }

    /// Apply the operation to `msg`, producing the child value
    pub fn apply(&self, msg: &[u8]) -> Result<Vec<u8>> {
        if msg.len() > MAX_MSG_LENGTH {
            return Err(Error::MalformedProof(format!(
                "{} input of {} bytes exceeds {} bytes",
                self.name(),
                msg.len(),
                MAX_MSG_LENGTH
            )));
        }

        let out = match self {
            Op::Hash(algorithm) => algorithm.digest(msg),
            Op::Append(payload) => {
                check_payload(payload)?;
                [msg, payload.as_slice()].concat()
            }
            Op::Prepend(payload) => {
                check_payload(payload)?;
                [payload.as_slice(), msg].concat()
            }
        };

        if out.len() > MAX_MSG_LENGTH {
            return Err(Error::MalformedProof(format!(
                "{} result of {} bytes exceeds {} bytes",
                self.name(),
                out.len(),
                MAX_MSG_LENGTH
            )));
        }
        Ok(out)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::Hash(algorithm) => algorithm.name(),
            Op::Append(_) => "append",
            Op::Prepend(_) => "prepend",
        }
    }
}

fn check_payload(payload: &[u8]) -> Result<()> {
    if payload.is_empty() || payload.len() > MAX_OP_PAYLOAD {
        return Err(Error::MalformedProof(format!(
            "operation payload of {} bytes outside 1..={}",
            payload.len(),
            MAX_OP_PAYLOAD
        )));
    }
    Ok(())
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Hash(algorithm) => write!(f, "{}", algorithm.name()),
            Op::Append(payload) => write!(f, "append {}", hex::encode(payload)),
            Op::Prepend(payload) => write!(f, "prepend {}", hex::encode(payload)),
        }
    }
}
