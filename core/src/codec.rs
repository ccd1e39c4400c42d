//! Canonical binary encoding of proofs
//!
//! Integers are LEB128 varuints, byte strings are `varuint length || bytes`.
//!
//! ```text
//! file        := MAGIC version:u8 file_op node
//! node        := varbytes(value)
//!                varuint(n_ops)  (op node)*        sorted by op
//!                varuint(n_atts) attestation*      sorted by (tag, payload)
//! op          := 0x08 | 0xf0 varbytes | 0xf1 varbytes
//! attestation := tag[8] varbytes(payload)
//! ```
//!
//! Decoding accepts only the canonical form, so re-encoding a decoded proof
//! reproduces the input byte for byte. Calendar servers exchange bare `node`
//! encodings.

use crate::timestamp::attestation::{self, Attestation, MAX_URI_LENGTH, TAG_LEN};
use crate::timestamp::op::{MAX_MSG_LENGTH, MAX_OP_PAYLOAD};
use crate::timestamp::{DetachedTimestampFile, HashAlgorithm, Op, Timestamp};
use crate::version::{is_format_compatible, FORMAT_VERSION};
use crate::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Leading bytes of every serialized proof file
pub const MAGIC: &[u8; 15] = b"\x00toldyou\x00proof\x00";

/// Deepest tree accepted when decoding
pub const MAX_DEPTH: usize = 256;

/// Most ops or attestations a single node may carry
pub const MAX_FANOUT: u64 = 256;

/// Largest attestation payload accepted
pub const MAX_ATTESTATION_PAYLOAD: usize = 8192;

pub fn put_varuint(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

pub fn put_varbytes(buf: &mut impl BufMut, bytes: &[u8]) {
    put_varuint(buf, bytes.len() as u64);
    buf.put_slice(bytes);
}

fn put_op(buf: &mut impl BufMut, op: &Op) {
    buf.put_u8(op.tag());
    match op {
        Op::Hash(_) => {}
        Op::Append(payload) | Op::Prepend(payload) => put_varbytes(buf, payload),
    }
}

fn put_timestamp(buf: &mut impl BufMut, timestamp: &Timestamp) {
    put_varbytes(buf, timestamp.msg());

    put_varuint(buf, timestamp.ops().len() as u64);
    for (op, child) in timestamp.ops() {
        put_op(buf, op);
        put_timestamp(buf, child);
    }

    put_varuint(buf, timestamp.attestations().len() as u64);
    for attestation in timestamp.attestations() {
        buf.put_slice(&attestation.tag());
        put_varbytes(buf, &attestation.payload());
    }
}

/// Encode a bare tree, as exchanged with calendar servers
pub fn encode_timestamp(timestamp: &Timestamp) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_timestamp(&mut buf, timestamp);
    buf.to_vec()
}

/// Encode a proof file for storage
pub fn serialize(file: &DetachedTimestampFile) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(MAGIC.len() + 64);
    buf.put_slice(MAGIC);
    buf.put_u8(FORMAT_VERSION);
    put_op(&mut buf, &Op::Hash(file.file_hash_op));
    put_timestamp(&mut buf, &file.timestamp);
    buf.to_vec()
}

/// Decode a bare tree; the whole input must be consumed
pub fn decode_timestamp(bytes: &[u8]) -> Result<Timestamp> {
    let mut reader = Reader::new(bytes);
    let timestamp = reader.read_timestamp(0)?;
    reader.finish()?;
    Ok(timestamp)
}

/// Decode a stored proof file
pub fn deserialize(bytes: &[u8]) -> Result<DetachedTimestampFile> {
    let mut reader = Reader::new(bytes);

    if reader.read_slice(MAGIC.len())? != MAGIC {
        return Err(malformed("bad magic bytes"));
    }

    let version = reader.read_u8()?;
    if !is_format_compatible(version) {
        return Err(malformed(format!("unsupported format version {}", version)));
    }

    let file_hash_op = match reader.read_op()? {
        Op::Hash(algorithm) => algorithm,
        other => return Err(malformed(format!("file hash op must be a hash, got {}", other.name()))),
    };

    let timestamp = reader.read_timestamp(0)?;
    reader.finish()?;
    DetachedTimestampFile::new(file_hash_op, timestamp)
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedProof(msg.into())
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn read_u8(&mut self) -> Result<u8> {
        if !self.buf.has_remaining() {
            return Err(malformed("unexpected end of input"));
        }
        Ok(self.buf.get_u8())
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.buf.remaining() < len {
            return Err(malformed(format!(
                "wanted {} bytes, {} left",
                len,
                self.buf.remaining()
            )));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn read_varuint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift == 63 && byte > 1 {
                return Err(malformed("varuint overflows 64 bits"));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                if byte == 0 && shift > 0 {
                    return Err(malformed("non-canonical varuint"));
                }
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(malformed("varuint overflows 64 bits"));
            }
        }
    }

    fn read_varbytes(&mut self, max: usize) -> Result<&'a [u8]> {
        let len = self.read_varuint()?;
        if len > max as u64 {
            return Err(malformed(format!("length {} exceeds {}", len, max)));
        }
        self.read_slice(len as usize)
    }

    fn read_count(&mut self) -> Result<u64> {
        let count = self.read_varuint()?;
        if count > MAX_FANOUT {
            return Err(malformed(format!("{} entries exceeds {}", count, MAX_FANOUT)));
        }
        Ok(count)
    }

    fn read_op(&mut self) -> Result<Op> {
        match self.read_u8()? {
            Op::TAG_SHA256 => Ok(Op::Hash(HashAlgorithm::Sha256)),
            Op::TAG_APPEND => Ok(Op::Append(self.read_varbytes(MAX_OP_PAYLOAD)?.to_vec())),
            Op::TAG_PREPEND => Ok(Op::Prepend(self.read_varbytes(MAX_OP_PAYLOAD)?.to_vec())),
            tag => Err(malformed(format!("unknown operation tag 0x{:02x}", tag))),
        }
    }

    fn read_attestation(&mut self) -> Result<Attestation> {
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(self.read_slice(TAG_LEN)?);
        let payload = self.read_varbytes(MAX_ATTESTATION_PAYLOAD)?;

        let mut inner = Reader::new(payload);
        let attestation = match tag {
            Attestation::PENDING_TAG => {
                let raw = inner.read_varbytes(MAX_URI_LENGTH)?;
                let uri = std::str::from_utf8(raw)
                    .map_err(|_| malformed("pending URI is not UTF-8"))?;
                if !attestation::is_valid_uri(uri) {
                    return Err(malformed(format!("invalid pending URI {:?}", uri)));
                }
                Attestation::Pending { uri: uri.to_string() }
            }
            Attestation::BITCOIN_TAG => Attestation::BitcoinBlockHeader {
                height: inner.read_varuint()?,
            },
            _ => {
                return Ok(Attestation::Unknown {
                    tag,
                    payload: payload.to_vec(),
                })
            }
        };
        inner.finish()?;
        Ok(attestation)
    }

    fn read_timestamp(&mut self, depth: usize) -> Result<Timestamp> {
        if depth > MAX_DEPTH {
            return Err(malformed(format!("tree deeper than {}", MAX_DEPTH)));
        }

        let mut timestamp = Timestamp::new(self.read_varbytes(MAX_MSG_LENGTH)?.to_vec());

        let n_ops = self.read_count()?;
        let mut prev_op: Option<Op> = None;
        for _ in 0..n_ops {
            let op = self.read_op()?;
            if prev_op.as_ref().map_or(false, |prev| *prev >= op) {
                return Err(malformed("operations out of canonical order"));
            }
            let child = self.read_timestamp(depth + 1)?;
            prev_op = Some(op.clone());
            timestamp.insert_child(op, child)?;
        }

        let n_atts = self.read_count()?;
        let mut prev_att: Option<Attestation> = None;
        for _ in 0..n_atts {
            let attestation = self.read_attestation()?;
            if prev_att.as_ref().map_or(false, |prev| *prev >= attestation) {
                return Err(malformed("attestations out of canonical order"));
            }
            prev_att = Some(attestation.clone());
            timestamp.add_attestation(attestation);
        }

        Ok(timestamp)
    }

    fn finish(&self) -> Result<()> {
        if self.buf.has_remaining() {
            return Err(malformed(format!("{} trailing bytes", self.buf.remaining())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;
    use proptest::prelude::*;

    fn sample_file() -> DetachedTimestampFile {
        let mut file = DetachedTimestampFile::from_message(b"hello");
        let leaf = file
            .timestamp
            .add_op(Op::Append(vec![0xaa; 16]))
            .unwrap()
            .add_op(Op::sha256())
            .unwrap();
        leaf.add_attestation(Attestation::Pending {
            uri: "https://a.pool.opentimestamps.org".to_string(),
        });
        leaf.add_op(Op::Prepend(vec![1, 2, 3]))
            .unwrap()
            .add_op(Op::sha256())
            .unwrap()
            .add_attestation(Attestation::BitcoinBlockHeader { height: 700_000 });
        file
    }

    #[test]
    fn test_varuint_encoding() {
        let mut buf = Vec::new();
        put_varuint(&mut buf, 0);
        put_varuint(&mut buf, 127);
        put_varuint(&mut buf, 128);
        put_varuint(&mut buf, 300);
        assert_eq!(buf, vec![0x00, 0x7f, 0x80, 0x01, 0xac, 0x02]);

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.read_varuint().unwrap(), 0);
        assert_eq!(reader.read_varuint().unwrap(), 127);
        assert_eq!(reader.read_varuint().unwrap(), 128);
        assert_eq!(reader.read_varuint().unwrap(), 300);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_varuint_max_and_overflow() {
        let mut buf = Vec::new();
        put_varuint(&mut buf, u64::MAX);
        assert_eq!(Reader::new(&buf).read_varuint().unwrap(), u64::MAX);

        let too_big = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02];
        assert!(Reader::new(&too_big).read_varuint().is_err());
    }

    #[test]
    fn test_non_canonical_varuint_rejected() {
        assert!(Reader::new(&[0x80, 0x00]).read_varuint().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let file = sample_file();
        let bytes = serialize(&file);
        assert!(bytes.starts_with(MAGIC));
        assert_eq!(deserialize(&bytes).unwrap(), file);
    }

    #[test]
    fn test_unattested_leaf_is_storable() {
        let mut file = DetachedTimestampFile::from_message(b"offline");
        file.timestamp
            .add_op(Op::Append(vec![1; 16]))
            .unwrap()
            .add_op(Op::sha256())
            .unwrap();
        let decoded = deserialize(&serialize(&file)).unwrap();
        assert_eq!(decoded, file);
        assert!(decoded.timestamp.frontier().is_none());
    }

    #[test]
    fn test_bare_timestamp_roundtrip() {
        let file = sample_file();
        let leaf = file.timestamp.leaf().unwrap().clone();
        let encoded = encode_timestamp(&leaf);
        assert_eq!(decode_timestamp(&encoded).unwrap(), leaf);
    }

    #[test]
    fn test_unknown_attestation_preserved() {
        let mut ts = Timestamp::new(crypto::sha256(b"x").to_vec());
        ts.add_attestation(Attestation::Unknown {
            tag: [1, 2, 3, 4, 5, 6, 7, 8],
            payload: vec![0xde, 0xad],
        });
        let encoded = encode_timestamp(&ts);
        let decoded = decode_timestamp(&encoded).unwrap();
        assert_eq!(decoded, ts);
        assert_eq!(encode_timestamp(&decoded), encoded);
    }

    #[test]
    fn test_truncated_input_rejected() {
        let bytes = serialize(&sample_file());
        for cut in [0, 5, MAGIC.len(), MAGIC.len() + 2, bytes.len() - 1] {
            assert!(
                matches!(deserialize(&bytes[..cut]), Err(Error::MalformedProof(_))),
                "cut at {} accepted",
                cut
            );
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = serialize(&sample_file());
        bytes.push(0);
        assert!(deserialize(&bytes).is_err());
    }

    #[test]
    fn test_bad_magic_and_version_rejected() {
        let mut bytes = serialize(&sample_file());
        bytes[1] = b'T';
        assert!(deserialize(&bytes).is_err());

        let mut bytes = serialize(&sample_file());
        bytes[MAGIC.len()] = FORMAT_VERSION + 1;
        assert!(deserialize(&bytes).is_err());
    }

    #[test]
    fn test_forged_child_value_rejected() {
        // root "ab" --append "cd"--> child claiming to be "zzzz"
        let mut buf = Vec::new();
        put_varbytes(&mut buf, b"ab");
        put_varuint(&mut buf, 1);
        buf.push(Op::TAG_APPEND);
        put_varbytes(&mut buf, b"cd");
        put_varbytes(&mut buf, b"zzzz");
        put_varuint(&mut buf, 0);
        put_varuint(&mut buf, 0);
        put_varuint(&mut buf, 0);
        assert!(matches!(decode_timestamp(&buf), Err(Error::MalformedProof(_))));
    }

    #[test]
    fn test_out_of_order_ops_rejected() {
        let mut buf = Vec::new();
        put_varbytes(&mut buf, b"ab");
        put_varuint(&mut buf, 2);
        buf.push(Op::TAG_APPEND);
        put_varbytes(&mut buf, b"cd");
        put_varbytes(&mut buf, b"abcd");
        put_varuint(&mut buf, 0);
        put_varuint(&mut buf, 0);
        buf.push(Op::TAG_SHA256);
        put_varbytes(&mut buf, &crypto::sha256(b"ab"));
        put_varuint(&mut buf, 0);
        put_varuint(&mut buf, 0);
        put_varuint(&mut buf, 0);
        assert!(decode_timestamp(&buf).is_err());
    }

    #[test]
    fn test_pending_payload_trailing_bytes_rejected() {
        let mut payload = Vec::new();
        put_varbytes(&mut payload, b"https://a.example");
        payload.push(0xff);

        let mut buf = Vec::new();
        put_varbytes(&mut buf, b"ab");
        put_varuint(&mut buf, 0);
        put_varuint(&mut buf, 1);
        buf.extend_from_slice(&Attestation::PENDING_TAG);
        put_varbytes(&mut buf, &payload);
        assert!(decode_timestamp(&buf).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut root = Timestamp::new(b"x".to_vec());
        let mut node = &mut root;
        for _ in 0..(MAX_DEPTH + 1) {
            node = node.add_op(Op::sha256()).unwrap();
        }
        let encoded = encode_timestamp(&root);
        assert!(decode_timestamp(&encoded).is_err());
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::sha256()),
            prop::collection::vec(any::<u8>(), 1..16).prop_map(Op::Append),
            prop::collection::vec(any::<u8>(), 1..16).prop_map(Op::Prepend),
        ]
    }

    fn arb_attestation() -> impl Strategy<Value = Attestation> {
        prop_oneof![
            any::<u64>().prop_map(|height| Attestation::BitcoinBlockHeader { height }),
            "[a-z]{1,12}".prop_map(|host| Attestation::Pending {
                uri: format!("https://{}.example", host)
            }),
            (any::<[u8; 8]>(), prop::collection::vec(any::<u8>(), 0..8)).prop_map(
                |(tag, payload)| {
                    if tag == Attestation::PENDING_TAG || tag == Attestation::BITCOIN_TAG {
                        Attestation::BitcoinBlockHeader { height: 1 }
                    } else {
                        Attestation::Unknown { tag, payload }
                    }
                }
            ),
        ]
    }

    fn arb_file() -> impl Strategy<Value = DetachedTimestampFile> {
        let path = (prop::collection::vec(arb_op(), 0..6), prop::option::of(arb_attestation()));
        (any::<Vec<u8>>(), prop::collection::vec(path, 0..5)).prop_map(|(message, paths)| {
            let mut file = DetachedTimestampFile::from_message(&message);
            for (ops, attestation) in paths {
                let mut node = &mut file.timestamp;
                for op in ops {
                    node = node.add_op(op).unwrap();
                }
                if let Some(attestation) = attestation {
                    node.add_attestation(attestation);
                }
            }
            file
        })
    }

    proptest! {
        #[test]
        fn prop_roundtrip(file in arb_file()) {
            let bytes = serialize(&file);
            let decoded = deserialize(&bytes).unwrap();
            prop_assert_eq!(&decoded, &file);
            prop_assert_eq!(serialize(&decoded), bytes);
        }
    }
}
