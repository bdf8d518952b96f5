//! Key namespacing.
//!
//! A [`Subspace`] is a fixed byte prefix under which an application packs
//! its tuples. All keys of one logical record share the prefix
//! `subspace.pack(primary_key)`; [`prefix_range`] produces the range that
//! covers every key starting with a prefix, including the bare prefix
//! itself (which the legacy unsplit layout uses as a full key).

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Result, Tuple, TupleError};

/// A fixed byte prefix namespacing tuple-encoded keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subspace {
    raw: Bytes,
}

impl Subspace {
    /// Creates a subspace from a raw prefix.
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self { raw: raw.into() }
    }

    /// Creates a subspace whose prefix is the packed form of `tuple`.
    pub fn from_tuple(tuple: &Tuple) -> Self {
        Self { raw: tuple.pack() }
    }

    /// Returns the raw prefix bytes.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Packs a tuple under this subspace's prefix.
    pub fn pack(&self, tuple: &Tuple) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.raw.len());
        buf.put_slice(&self.raw);
        tuple.pack_into(&mut buf);
        buf.freeze()
    }

    /// Unpacks a key that lies within this subspace.
    pub fn unpack(&self, key: &[u8]) -> Result<Tuple> {
        if !self.contains(key) {
            return Err(TupleError::NotInSubspace {
                key: Bytes::copy_from_slice(key),
            });
        }
        Tuple::unpack(&key[self.raw.len()..])
    }

    /// Returns `true` if `key` starts with this subspace's prefix.
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.raw)
    }

    /// Returns the child subspace obtained by appending `tuple`.
    pub fn subspace(&self, tuple: &Tuple) -> Subspace {
        Subspace {
            raw: self.pack(tuple),
        }
    }

    /// Returns the range covering every tuple-encoded key in this
    /// subspace (excluding the bare prefix itself).
    pub fn range(&self) -> (Bytes, Bytes) {
        let mut begin = BytesMut::with_capacity(self.raw.len() + 1);
        begin.put_slice(&self.raw);
        begin.put_u8(0x00);
        let mut end = BytesMut::with_capacity(self.raw.len() + 1);
        end.put_slice(&self.raw);
        end.put_u8(0xFF);
        (begin.freeze(), end.freeze())
    }
}

/// Returns the first key strictly greater than every key starting with
/// `prefix`: the prefix with trailing `0xFF` bytes stripped and the last
/// remaining byte incremented.
pub fn strinc(prefix: &[u8]) -> Result<Bytes> {
    let stripped_len = prefix
        .iter()
        .rposition(|&b| b != 0xFF)
        .map(|i| i + 1)
        .ok_or(TupleError::UnboundedPrefix)?;
    let mut out = prefix[..stripped_len].to_vec();
    let last = out
        .last_mut()
        .expect("stripped prefix is non-empty by construction");
    *last += 1;
    Ok(Bytes::from(out))
}

/// Returns the `[prefix, strinc(prefix))` range covering every key that
/// starts with `prefix`, including the bare prefix itself.
pub fn prefix_range(prefix: &[u8]) -> Result<(Bytes, Bytes)> {
    Ok((Bytes::copy_from_slice(prefix), strinc(prefix)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        let subspace = Subspace::new(Bytes::from_static(b"\x15\x2A"));
        let pk = Tuple::new().with("order").with(17i64);
        let key = subspace.pack(&pk);
        assert!(subspace.contains(&key));
        assert_eq!(subspace.unpack(&key).unwrap(), pk);
    }

    #[test]
    fn unpack_rejects_foreign_key() {
        let subspace = Subspace::new(Bytes::from_static(b"\x15\x2A"));
        assert!(matches!(
            subspace.unpack(b"\x16\x00"),
            Err(TupleError::NotInSubspace { .. })
        ));
    }

    #[test]
    fn strinc_strips_trailing_ff() {
        assert_eq!(strinc(b"a\xFF\xFF").unwrap(), Bytes::from_static(b"b"));
        assert_eq!(strinc(b"ab").unwrap(), Bytes::from_static(b"ac"));
        assert!(strinc(b"\xFF\xFF").is_err());
    }

    #[test]
    fn prefix_range_covers_bare_prefix_and_children() {
        let (begin, end) = prefix_range(b"key").unwrap();
        assert_eq!(begin, Bytes::from_static(b"key"));
        assert_eq!(end, Bytes::from_static(b"kez"));
        assert!(&b"key"[..] >= &begin[..] && &b"key"[..] < &end[..]);
        assert!(&b"key\x00"[..] < &end[..]);
        assert!(&b"key\xFF\xFF"[..] < &end[..]);
    }

    #[test]
    fn child_subspace_nests() {
        let root = Subspace::new(Bytes::from_static(b"\x01"));
        let child = root.subspace(&Tuple::new().with(9i64));
        let key = child.pack(&Tuple::new().with(1i64));
        assert!(root.contains(&key));
        assert!(child.contains(&key));
    }
}
