//! Operation trees
//!
//! A [`Timestamp`] is a node holding a value, the operations that derive
//! child values from it, and the attestations made about it. Proofs are
//! chains of such nodes from a message digest down to an attested value.

pub mod attestation;
pub mod op;

pub use attestation::Attestation;
pub use op::{HashAlgorithm, Op};

use crate::{Error, Result};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A node of the operation tree.
///
/// Every child's value is its op applied to this node's value. The fields
/// are private so that invariant holds for any tree reachable from the API.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Timestamp {
    msg: Vec<u8>,
    ops: BTreeMap<Op, Timestamp>,
    attestations: BTreeSet<Attestation>,
}

impl Timestamp {
    pub fn new(msg: impl Into<Vec<u8>>) -> Self {
        Self {
            msg: msg.into(),
            ops: BTreeMap::new(),
            attestations: BTreeSet::new(),
        }
    }

    /// Value at this node
    pub fn msg(&self) -> &[u8] {
        &self.msg
    }

    pub fn ops(&self) -> &BTreeMap<Op, Timestamp> {
        &self.ops
    }

    pub fn attestations(&self) -> &BTreeSet<Attestation> {
        &self.attestations
    }

    /// Returns false if the attestation was already present
    pub fn add_attestation(&mut self, attestation: Attestation) -> bool {
        self.attestations.insert(attestation)
    }

    /// Add `op` below this node and return the child it leads to.
    /// Adding an op that already exists returns the existing child.
    pub fn add_op(&mut self, op: Op) -> Result<&mut Timestamp> {
        let value = op.apply(&self.msg)?;
        Ok(self.ops.entry(op).or_insert_with(|| Timestamp::new(value)))
    }

    /// Attach an already-built subtree, checking that `op` really derives it
    pub(crate) fn insert_child(&mut self, op: Op, child: Timestamp) -> Result<()> {
        let expected = op.apply(&self.msg)?;
        if expected != child.msg {
            return Err(Error::MalformedProof(format!(
                "{} of {} does not yield {}",
                op,
                hex::encode(&self.msg),
                hex::encode(&child.msg)
            )));
        }
        match self.ops.entry(op) {
            Entry::Occupied(mut existing) => existing.get_mut().merge(child),
            Entry::Vacant(slot) => {
                slot.insert(child);
                Ok(())
            }
        }
    }

    /// Merge everything `other` knows about this value into `self`.
    ///
    /// Attestations are unioned node by node; subtrees missing from `self`
    /// are grafted in. Nothing is ever removed.
    pub fn merge(&mut self, other: Timestamp) -> Result<()> {
        if self.msg != other.msg {
            return Err(Error::MalformedProof(format!(
                "cannot merge timestamps for different values: {} vs {}",
                hex::encode(&self.msg),
                hex::encode(&other.msg)
            )));
        }

        self.attestations.extend(other.attestations);
        for (op, child) in other.ops {
            match self.ops.entry(op) {
                Entry::Occupied(mut existing) => existing.get_mut().merge(child)?,
                Entry::Vacant(slot) => {
                    slot.insert(child);
                }
            }
        }
        Ok(())
    }

    pub fn is_leaf(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn has_attestations(&self) -> bool {
        !self.attestations.is_empty()
    }

    pub fn has_bitcoin_attestation(&self) -> bool {
        self.attestations.iter().any(Attestation::is_bitcoin)
    }

    /// The resolution frontier: the first node in canonical depth-first
    /// order carrying a Bitcoin attestation, or failing that the first node
    /// carrying any attestation.
    pub fn frontier(&self) -> Option<&Timestamp> {
        self.find(Self::has_bitcoin_attestation)
            .or_else(|| self.find(Self::has_attestations))
    }

    pub fn frontier_mut(&mut self) -> Option<&mut Timestamp> {
        if self.find(Self::has_bitcoin_attestation).is_some() {
            return self.find_mut(Self::has_bitcoin_attestation);
        }
        self.find_mut(Self::has_attestations)
    }

    /// End of the primary chain (first op at every level)
    pub fn leaf(&self) -> Option<&Timestamp> {
        self.find(Self::is_leaf)
    }

    pub fn leaf_mut(&mut self) -> Option<&mut Timestamp> {
        self.find_mut(Self::is_leaf)
    }

    /// True once the frontier is anchored in a Bitcoin block header
    pub fn is_verified(&self) -> bool {
        self.frontier()
            .map_or(false, Timestamp::has_bitcoin_attestation)
    }

    /// True when every leaf carries at least one attestation
    pub fn is_resolved(&self) -> bool {
        if self.is_leaf() {
            return self.has_attestations();
        }
        self.ops.values().all(Timestamp::is_resolved)
    }

    /// Every attestation in the tree with the value it attests
    pub fn all_attestations(&self) -> Vec<(&[u8], &Attestation)> {
        let mut out = Vec::new();
        self.collect_attestations(&mut out);
        out
    }

    fn collect_attestations<'a>(&'a self, out: &mut Vec<(&'a [u8], &'a Attestation)>) {
        for attestation in &self.attestations {
            out.push((&self.msg, attestation));
        }
        for child in self.ops.values() {
            child.collect_attestations(out);
        }
    }

    fn find(&self, pred: fn(&Timestamp) -> bool) -> Option<&Timestamp> {
        if pred(self) {
            return Some(self);
        }
        self.ops.values().find_map(|child| child.find(pred))
    }

    fn find_mut(&mut self, pred: fn(&Timestamp) -> bool) -> Option<&mut Timestamp> {
        if pred(self) {
            return Some(self);
        }
        for child in self.ops.values_mut() {
            if let Some(found) = child.find_mut(pred) {
                return Some(found);
            }
        }
        None
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = " ".repeat(indent);
        for attestation in &self.attestations {
            writeln!(f, "{}verify {}", pad, attestation)?;
        }

        let branching = self.ops.len() > 1;
        for (op, child) in &self.ops {
            if branching {
                writeln!(f, "{} -> {}", pad, op)?;
                child.fmt_tree(f, indent + 4)?;
            } else {
                writeln!(f, "{}{}", pad, op)?;
                child.fmt_tree(f, indent)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

/// A proof for a whole message: how the message was hashed plus the tree
/// rooted at that hash. This is the unit persisted in the record store.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DetachedTimestampFile {
    pub file_hash_op: HashAlgorithm,
    pub timestamp: Timestamp,
}

impl DetachedTimestampFile {
    pub fn new(file_hash_op: HashAlgorithm, timestamp: Timestamp) -> Result<Self> {
        if timestamp.msg().len() != file_hash_op.digest_len() {
            return Err(Error::MalformedProof(format!(
                "{} digest must be {} bytes, got {}",
                file_hash_op.name(),
                file_hash_op.digest_len(),
                timestamp.msg().len()
            )));
        }
        Ok(Self {
            file_hash_op,
            timestamp,
        })
    }

    /// Bare file for `message`: a single unattested node holding its SHA-256
    pub fn from_message(message: &[u8]) -> Self {
        let algorithm = HashAlgorithm::Sha256;
        Self {
            file_hash_op: algorithm,
            timestamp: Timestamp::new(algorithm.digest(message)),
        }
    }

    pub fn file_digest(&self) -> &[u8] {
        self.timestamp.msg()
    }
}

impl fmt::Display for DetachedTimestampFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "File {} hash: {}",
            self.file_hash_op.name(),
            hex::encode(self.file_digest())
        )?;
        writeln!(f, "Timestamp:")?;
        write!(f, "{}", self.timestamp)
    }
}
