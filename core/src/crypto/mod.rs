//! Cryptographic primitives module
//!
//! This module provides:
//! - SHA-256 digests for messages and commitment chains
//! - Random nonces for salting commitments

use crate::types::Digest;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

/// Length of the nonce appended to a message digest before submission
pub const NONCE_LEN: usize = 16;

/// Hash data with SHA-256
pub fn sha256(data: &[u8]) -> Digest {
    use sha2::Digest as _;
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    bytes
}

/// Draw a fresh nonce from the OS RNG
pub fn fresh_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}
