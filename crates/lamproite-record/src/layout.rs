//! Suffix constants and the per-entry key/value codec.
//!
//! Pure functions producing and parsing the key layout
//! `prefix ∥ tuple_int(suffix)` and the tuple-packed version value. The
//! layout is bit-exact: the tuple integer encoding guarantees
//! `-1 < 0 < 1 < 2 …` under byte comparison, so the version entry sorts
//! before all data entries of its record.

use bytes::{BufMut, Bytes, BytesMut};
use lamproite_tuple::{Tuple, VERSIONSTAMP_LEN, Versionstamp};

use crate::{Result, SplitError};

/// Maximum payload bytes stored in a single entry.
pub const CHUNK_SIZE: usize = 100_000;

/// Suffix of a record's version entry.
pub const VERSION_SUFFIX: i64 = -1;

/// Suffix of an unsplit payload entry.
pub const UNSPLIT_SUFFIX: i64 = 0;

/// Suffix of the first split chunk.
pub const START_SPLIT_SUFFIX: i64 = 1;

/// Length of a record version in bytes.
pub const VERSION_LENGTH: usize = VERSIONSTAMP_LEN;

/// Packs the key of a data or version entry: `prefix ∥ tuple_int(suffix)`.
pub fn data_key(prefix: &[u8], suffix: i64) -> Bytes {
    let mut buf = BytesMut::with_capacity(prefix.len() + 2);
    buf.put_slice(prefix);
    Tuple::new().with(suffix).pack_into(&mut buf);
    buf.freeze()
}

/// Packs the key of a record's version entry.
pub fn version_key(prefix: &[u8]) -> Bytes {
    data_key(prefix, VERSION_SUFFIX)
}

/// Strips `prefix` from `full_key` and decodes the single integer suffix.
///
/// Fails with [`SplitError::SubkeyShape`] unless the remainder is exactly
/// one tuple-encoded integer.
pub fn parse_suffix(full_key: &[u8], prefix: &[u8]) -> Result<i64> {
    let shape = || SplitError::SubkeyShape {
        key: Bytes::copy_from_slice(full_key),
        prefix: Bytes::copy_from_slice(prefix),
    };
    let rest = full_key.strip_prefix(prefix).ok_or_else(shape)?;
    let tuple = Tuple::unpack(rest).map_err(|_| shape())?;
    if tuple.len() != 1 {
        return Err(shape());
    }
    tuple.int(0).map_err(|_| shape())
}

/// Packs a version value.
///
/// Complete stamps pack to their final 13 bytes (type code plus stamp).
/// Incomplete stamps pack to a versionstamped-mutation buffer: the same
/// 13 bytes with placeholder transaction bytes, followed by a 4-byte
/// little-endian offset pointing at the placeholder. The offset tail is
/// consumed by the store at commit and is never durable.
pub fn pack_version(version: &Versionstamp) -> Result<Bytes> {
    let tuple = Tuple::new().with(version.clone());
    if version.is_complete() {
        Ok(tuple.pack())
    } else {
        Ok(tuple.pack_with_versionstamp()?)
    }
}

/// Unpacks a version value read from the store.
///
/// Values read back are always complete: the placeholder was resolved
/// when the writing transaction committed.
pub fn unpack_version(value: &[u8]) -> Result<Versionstamp> {
    let tuple = Tuple::unpack(value)?;
    Ok(tuple.versionstamp(0)?.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_key_sorts_before_data_keys() {
        let prefix = b"record";
        let version = version_key(prefix);
        let unsplit = data_key(prefix, UNSPLIT_SUFFIX);
        let first_split = data_key(prefix, START_SPLIT_SUFFIX);
        let second_split = data_key(prefix, START_SPLIT_SUFFIX + 1);
        assert!(version < unsplit);
        assert!(unsplit < first_split);
        assert!(first_split < second_split);
    }

    #[test]
    fn suffix_roundtrip() {
        let prefix = b"rec";
        for suffix in [VERSION_SUFFIX, UNSPLIT_SUFFIX, 1, 2, 1_000_000] {
            let key = data_key(prefix, suffix);
            assert_eq!(parse_suffix(&key, prefix).unwrap(), suffix);
        }
    }

    #[test]
    fn suffix_shape_violations() {
        let prefix = b"rec";
        // Wrong prefix.
        assert!(matches!(
            parse_suffix(b"other\x14", prefix),
            Err(SplitError::SubkeyShape { .. })
        ));
        // Two trailing elements.
        let mut key = BytesMut::new();
        key.put_slice(prefix);
        Tuple::new().with(1i64).with(2i64).pack_into(&mut key);
        assert!(matches!(
            parse_suffix(&key, prefix),
            Err(SplitError::SubkeyShape { .. })
        ));
        // Non-integer suffix.
        let mut key = BytesMut::new();
        key.put_slice(prefix);
        Tuple::new().with("s").pack_into(&mut key);
        assert!(matches!(
            parse_suffix(&key, prefix),
            Err(SplitError::SubkeyShape { .. })
        ));
    }

    #[test]
    fn complete_version_value_roundtrip() {
        let vs = Versionstamp::complete([3; 10], 9);
        let value = pack_version(&vs).unwrap();
        assert_eq!(value.len(), 1 + VERSION_LENGTH);
        assert_eq!(unpack_version(&value).unwrap(), vs);
    }

    #[test]
    fn incomplete_version_value_carries_offset_tail() {
        let vs = Versionstamp::incomplete(7);
        let value = pack_version(&vs).unwrap();
        // 13 durable bytes plus the 4-byte offset tail.
        assert_eq!(value.len(), 1 + VERSION_LENGTH + 4);
        let offset = u32::from_le_bytes(value[value.len() - 4..].try_into().unwrap());
        assert_eq!(offset, 1);
    }
}
