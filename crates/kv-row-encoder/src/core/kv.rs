//! Physical key-value output and the byte codecs used to build it.
//!
//! Every pair produced for a row carries a [`RowIdTag`]: the row sequence
//! number in an order-preserving variable-length form, so that pairs sort and
//! group by their source row.

use std::fmt;

use crate::error::{EncodeError, Result};

/// Negative values use tags `[0, 8)`, `8 - length`.
const NEGATIVE_TAG_END: u8 = 8;
/// Multi-byte positive values use tags `(247, 255]`, `247 + length`.
const POSITIVE_TAG_START: u8 = 0xff - 8;

/// Longest encoding produced by [`encode_comparable_varint`].
pub const MAX_VARINT_LEN: usize = 9;

const SIGN_FLIP_MASK: u64 = 1u64 << 63;
const TABLE_PREFIX: u8 = b't';
const RECORD_PREFIX_SEP: &[u8] = b"_r";

/// Append `v` in a byte-comparable variable-length form.
///
/// Byte-wise comparison of two encodings orders like the integers themselves.
/// Values in `0..=239` take one byte; everything else takes a tag byte plus
/// the minimal number of big-endian payload bytes.
pub fn encode_comparable_varint(buf: &mut Vec<u8>, v: i64) {
    if v < 0 {
        let len = if v >= -0xff {
            1
        } else if v >= -0xffff {
            2
        } else if v >= -0xff_ffff {
            3
        } else if v >= -0xffff_ffff {
            4
        } else if v >= -0xff_ffff_ffff {
            5
        } else if v >= -0xffff_ffff_ffff {
            6
        } else if v >= -0xff_ffff_ffff_ffff {
            7
        } else {
            8
        };
        buf.push(NEGATIVE_TAG_END - len as u8);
        buf.extend_from_slice(&v.to_be_bytes()[8 - len..]);
        return;
    }
    encode_comparable_uvarint(buf, v as u64);
}

/// Unsigned counterpart of [`encode_comparable_varint`].
pub fn encode_comparable_uvarint(buf: &mut Vec<u8>, v: u64) {
    if v <= u64::from(POSITIVE_TAG_START - NEGATIVE_TAG_END) {
        buf.push(v as u8 + NEGATIVE_TAG_END);
        return;
    }
    let len = 8 - (v.leading_zeros() / 8) as usize;
    buf.push(POSITIVE_TAG_START + len as u8);
    buf.extend_from_slice(&v.to_be_bytes()[8 - len..]);
}

/// Decode one value written by [`encode_comparable_varint`].
///
/// Returns the value and the unconsumed remainder of `b`.
pub fn decode_comparable_varint(b: &[u8]) -> Result<(i64, &[u8])> {
    let (&first, rest) = b
        .split_first()
        .ok_or_else(|| EncodeError::Insert("insufficient bytes to decode varint".into()))?;
    if (NEGATIVE_TAG_END..=POSITIVE_TAG_START).contains(&first) {
        return Ok((i64::from(first) - i64::from(NEGATIVE_TAG_END), rest));
    }
    let (len, mut v) = if first < NEGATIVE_TAG_END {
        ((NEGATIVE_TAG_END - first) as usize, u64::MAX)
    } else {
        ((first - POSITIVE_TAG_START) as usize, 0u64)
    };
    if rest.len() < len {
        return Err(EncodeError::Insert(format!(
            "varint needs {} payload bytes, got {}",
            len,
            rest.len()
        )));
    }
    for &c in &rest[..len] {
        v = (v << 8) | u64::from(c);
    }
    if first > POSITIVE_TAG_START && v > i64::MAX as u64 {
        return Err(EncodeError::Insert("varint overflows i64".into()));
    }
    if first < NEGATIVE_TAG_END && v <= i64::MAX as u64 {
        return Err(EncodeError::Insert("malformed negative varint".into()));
    }
    Ok((v as i64, &rest[len..]))
}

/// Fixed-width memcomparable form of an `i64` (sign bit flipped, big-endian).
pub fn encode_i64_ordered(value: i64) -> [u8; 8] {
    (value as u64 ^ SIGN_FLIP_MASK).to_be_bytes()
}

pub fn decode_i64_ordered(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ SIGN_FLIP_MASK) as i64
}

/// Record key of a row: `t{table_id}_r{handle}` with ordered integers.
pub fn encode_record_key(table_id: i64, handle: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8 + RECORD_PREFIX_SEP.len() + 8);
    key.push(TABLE_PREFIX);
    key.extend_from_slice(&encode_i64_ordered(table_id));
    key.extend_from_slice(RECORD_PREFIX_SEP);
    key.extend_from_slice(&encode_i64_ordered(handle));
    key
}

/// Split a record key back into `(table_id, handle)`.
pub fn decode_record_key(key: &[u8]) -> Result<(i64, i64)> {
    if key.len() != 19 || key[0] != TABLE_PREFIX || &key[9..11] != RECORD_PREFIX_SEP {
        return Err(EncodeError::Insert(format!(
            "not a record key: {} bytes",
            key.len()
        )));
    }
    let mut table = [0u8; 8];
    let mut handle = [0u8; 8];
    table.copy_from_slice(&key[1..9]);
    handle.copy_from_slice(&key[11..19]);
    Ok((decode_i64_ordered(table), decode_i64_ordered(handle)))
}

/// Provenance tag of a pair: the encoded row sequence number, stored inline.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RowIdTag {
    buf: [u8; MAX_VARINT_LEN],
    len: u8,
}

impl RowIdTag {
    pub fn new(row_seq: i64) -> Self {
        let mut scratch = Vec::with_capacity(MAX_VARINT_LEN);
        encode_comparable_varint(&mut scratch, row_seq);
        let mut buf = [0u8; MAX_VARINT_LEN];
        buf[..scratch.len()].copy_from_slice(&scratch);
        Self {
            buf,
            len: scratch.len() as u8,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Recover the row sequence number.
    pub fn decode(&self) -> Result<i64> {
        decode_comparable_varint(self.as_bytes()).map(|(v, _)| v)
    }
}

impl fmt::Debug for RowIdTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowIdTag({:02x?})", self.as_bytes())
    }
}

/// One physical key-value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: Vec<u8>,
    pub val: Vec<u8>,
    /// Source row of this pair. Empty until the encoder stamps it.
    pub row_id: RowIdTag,
}

impl KvPair {
    pub fn new(key: Vec<u8>, val: Vec<u8>) -> Self {
        Self {
            key,
            val,
            row_id: RowIdTag::default(),
        }
    }
}

/// The pairs produced for one row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvPairs {
    pub pairs: Vec<KvPair>,
}

impl KvPairs {
    pub fn new(pairs: Vec<KvPair>) -> Self {
        Self { pairs }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Total key and value bytes.
    pub fn size(&self) -> usize {
        self.pairs.iter().map(|p| p.key.len() + p.val.len()).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KvPair> {
        self.pairs.iter()
    }
}

impl IntoIterator for KvPairs {
    type Item = KvPair;
    type IntoIter = std::vec::IntoIter<KvPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}
