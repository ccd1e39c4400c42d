//! Attestations: claims that a value was observed by some authority

use crate::codec;
use std::cmp::Ordering;
use std::fmt;

/// Length of every attestation tag
pub const TAG_LEN: usize = 8;

/// Longest pending URI accepted
pub const MAX_URI_LENGTH: usize = 1000;

/// A claim attached to a tree node.
///
/// Equality and ordering compare the encoded `(tag, payload)` pair, which is
/// also the canonical serialization order.
#[derive(Clone, Debug)]
pub enum Attestation {
    /// Submitted to a calendar; the proof can be fetched from `uri` later
    Pending { uri: String },

    /// The node value is the Merkle root of the Bitcoin block at `height`.
    /// The Merkle path is the operation chain leading to this node.
    BitcoinBlockHeader { height: u64 },

    /// An attestation kind this crate does not interpret, kept verbatim
    Unknown { tag: [u8; TAG_LEN], payload: Vec<u8> },
}

impl Attestation {
    pub const PENDING_TAG: [u8; TAG_LEN] = [0x83, 0xdf, 0xe3, 0x0d, 0x2e, 0xf9, 0x0c, 0x8e];
    pub const BITCOIN_TAG: [u8; TAG_LEN] = [0x05, 0x88, 0x96, 0x0d, 0x73, 0xd7, 0x19, 0x01];

    pub fn tag(&self) -> [u8; TAG_LEN] {
        match self {
            Attestation::Pending { .. } => Self::PENDING_TAG,
            Attestation::BitcoinBlockHeader { .. } => Self::BITCOIN_TAG,
            Attestation::Unknown { tag, .. } => *tag,
        }
    }

    /// Encoded payload, without the outer length prefix
    pub fn payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Attestation::Pending { uri } => codec::put_varbytes(&mut buf, uri.as_bytes()),
            Attestation::BitcoinBlockHeader { height } => codec::put_varuint(&mut buf, *height),
            Attestation::Unknown { payload, .. } => buf.extend_from_slice(payload),
        }
        buf
    }

    pub fn is_bitcoin(&self) -> bool {
        matches!(self, Attestation::BitcoinBlockHeader { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Attestation::Pending { .. })
    }
}

/// Characters allowed in a pending URI
pub fn is_valid_uri(uri: &str) -> bool {
    uri.len() <= MAX_URI_LENGTH
        && uri
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-._/:".contains(&b))
}

impl PartialEq for Attestation {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Attestation {}

impl PartialOrd for Attestation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Attestation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag()
            .cmp(&other.tag())
            .then_with(|| self.payload().cmp(&other.payload()))
    }
}

impl fmt::Display for Attestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attestation::Pending { uri } => write!(f, "PendingAttestation('{}')", uri),
            Attestation::BitcoinBlockHeader { height } => {
                write!(f, "BitcoinBlockHeaderAttestation({})", height)
            }
            Attestation::Unknown { tag, payload } => write!(
                f,
                "UnknownAttestation({}, {})",
                hex::encode(tag),
                hex::encode(payload)
            ),
        }
    }
}
