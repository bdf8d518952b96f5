//! The reassembled record type.

use bytes::Bytes;
use lamproite_tuple::{Tuple, Versionstamp};

use crate::sizes::StoredSizes;

/// A logical record reassembled from the store.
///
/// Carries the primary key, the payload joined back from its entries, the
/// record version (durable, or synthesized from transaction-local state),
/// and the [`StoredSizes`] counters describing what was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    primary_key: Tuple,
    payload: Bytes,
    version: Option<Versionstamp>,
    sizes: StoredSizes,
}

impl RawRecord {
    pub(crate) fn new(
        primary_key: Tuple,
        payload: Bytes,
        version: Option<Versionstamp>,
        sizes: StoredSizes,
    ) -> Self {
        Self {
            primary_key,
            payload,
            version,
            sizes,
        }
    }

    /// Returns the record's primary key.
    pub fn primary_key(&self) -> &Tuple {
        &self.primary_key
    }

    /// Returns the record's payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the record's version, if any.
    pub fn version(&self) -> Option<&Versionstamp> {
        self.version.as_ref()
    }

    /// Returns the size counters observed while reading.
    pub fn sizes(&self) -> &StoredSizes {
        &self.sizes
    }

    /// Decomposes the record into its parts.
    pub fn into_parts(self) -> (Tuple, Bytes, Option<Versionstamp>, StoredSizes) {
        (self.primary_key, self.payload, self.version, self.sizes)
    }
}
