//! Commit-time version tokens.
//!
//! A [`Versionstamp`] is a 12-byte value: a 10-byte transaction version
//! assigned by the store at commit time, followed by a 2-byte user version
//! supplied by the caller. Stamps exist in one of two states:
//!
//! - **complete**: the transaction version is meaningful (read back from
//!   the store after commit)
//! - **incomplete**: the transaction version is the `0xFF` placeholder and
//!   the user version doubles as the transaction-local ordinal; the store
//!   fills in the real bytes when the transaction commits

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Result, TupleError};

/// Length of the store-assigned transaction version in bytes.
pub const TR_VERSION_LEN: usize = 10;

/// Length of the caller-supplied user version in bytes.
pub const USER_VERSION_LEN: usize = 2;

/// Total versionstamp length in bytes.
pub const VERSIONSTAMP_LEN: usize = TR_VERSION_LEN + USER_VERSION_LEN;

/// Placeholder transaction version carried by incomplete stamps.
const PLACEHOLDER: [u8; TR_VERSION_LEN] = [0xFF; TR_VERSION_LEN];

/// A 12-byte commit-ordered version token.
///
/// The first ten bytes are the transaction version, assigned by the store
/// so that committed transactions are totally ordered. The final two bytes
/// are the user version, which orders multiple stamps written within one
/// transaction. Comparing complete stamps therefore yields commit order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Versionstamp {
    // Field order matters: deriving Ord on (tr_version, user_version)
    // matches the byte-level order, with incomplete stamps (all-0xFF
    // transaction version) sorting after every complete stamp.
    tr_version: [u8; TR_VERSION_LEN],
    user_version: u16,
    complete: bool,
}

impl Versionstamp {
    /// Creates a complete versionstamp from a store-assigned transaction
    /// version and a user version.
    pub fn complete(tr_version: [u8; TR_VERSION_LEN], user_version: u16) -> Self {
        Self {
            complete: true,
            tr_version,
            user_version,
        }
    }

    /// Creates an incomplete versionstamp carrying only the user version.
    ///
    /// The user version is the transaction-local ordinal that identifies
    /// this stamp until the store resolves it at commit.
    pub fn incomplete(user_version: u16) -> Self {
        Self {
            complete: false,
            tr_version: PLACEHOLDER,
            user_version,
        }
    }

    /// Decodes a versionstamp from its 12-byte representation.
    ///
    /// A stamp whose transaction version is all `0xFF` decodes as
    /// incomplete; anything else is complete.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != VERSIONSTAMP_LEN {
            return Err(TupleError::VersionstampLength { found: bytes.len() });
        }
        let mut tr_version = [0u8; TR_VERSION_LEN];
        tr_version.copy_from_slice(&bytes[..TR_VERSION_LEN]);
        let user_version = u16::from_be_bytes([bytes[TR_VERSION_LEN], bytes[TR_VERSION_LEN + 1]]);
        Ok(Self {
            complete: tr_version != PLACEHOLDER,
            tr_version,
            user_version,
        })
    }

    /// Returns the 12-byte representation of this stamp.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(VERSIONSTAMP_LEN);
        buf.put_slice(&self.tr_version);
        buf.put_u16(self.user_version);
        buf.freeze()
    }

    /// Returns the store-assigned portion of this stamp.
    pub fn transaction_version(&self) -> &[u8; TR_VERSION_LEN] {
        &self.tr_version
    }

    /// Returns the caller-supplied portion of this stamp.
    pub fn user_version(&self) -> u16 {
        self.user_version
    }

    /// Returns `true` if the transaction version is meaningful.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TR: [u8; TR_VERSION_LEN] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A];

    #[test]
    fn complete_roundtrip() {
        let vs = Versionstamp::complete(TR, 657);
        assert!(vs.is_complete());
        let decoded = Versionstamp::from_bytes(&vs.to_bytes()).unwrap();
        assert_eq!(decoded, vs);
        assert_eq!(decoded.user_version(), 657);
    }

    #[test]
    fn incomplete_roundtrip() {
        let vs = Versionstamp::incomplete(657);
        assert!(!vs.is_complete());
        let bytes = vs.to_bytes();
        assert_eq!(&bytes[..TR_VERSION_LEN], &[0xFF; TR_VERSION_LEN]);
        assert_eq!(&bytes[TR_VERSION_LEN..], &[0x02, 0x91]);
        assert_eq!(Versionstamp::from_bytes(&bytes).unwrap(), vs);
    }

    #[test]
    fn wrong_length_rejected() {
        assert!(matches!(
            Versionstamp::from_bytes(b"short"),
            Err(TupleError::VersionstampLength { found: 5 })
        ));
    }

    #[test]
    fn complete_stamps_order_by_commit() {
        let older = Versionstamp::complete([0, 0, 0, 0, 0, 0, 0, 1, 0, 0], 0);
        let newer = Versionstamp::complete([0, 0, 0, 0, 0, 0, 0, 2, 0, 0], 0);
        assert!(older < newer);

        let first = Versionstamp::complete(TR, 1);
        let second = Versionstamp::complete(TR, 2);
        assert!(first < second);
    }
}
