//! The per-record reassembly state machine.
//!
//! Consumes the entries of one record in scan order and rebuilds the
//! payload and version. Legal suffix sequences:
//!
//! ```text
//! forward:  [VERSION]? ( UNSPLIT | 1 2 3 … )
//! reverse:  ( … 3 2 1 | UNSPLIT ) [VERSION]?
//! ```
//!
//! In a forward scan an unsplit entry completes the record immediately;
//! split chunks run until the prefix changes or the scan ends. In a
//! reverse scan the version entry is the completion signal, since it
//! sorts before all data and is therefore visited last.

use bytes::{BufMut, Bytes, BytesMut};
use lamproite_kv::{KeyValue, Transaction};
use lamproite_tuple::{Subspace, Tuple, Versionstamp};

use crate::layout::{
    self, START_SPLIT_SUFFIX, UNSPLIT_SUFFIX, VERSION_LENGTH, VERSION_SUFFIX,
};
use crate::record::RawRecord;
use crate::sizes::StoredSizes;
use crate::{Result, SplitError};

pub(crate) struct SplitAccumulator {
    prefix: Bytes,
    primary_key: Tuple,
    reverse: bool,
    old_version_format: bool,
    /// Payload pieces in arrival order; `None` until a data entry is seen.
    chunks: Option<Vec<Bytes>>,
    split: bool,
    version: Option<Versionstamp>,
    last_index: i64,
    sizes: StoredSizes,
}

impl SplitAccumulator {
    pub(crate) fn new(
        prefix: Bytes,
        primary_key: Tuple,
        reverse: bool,
        old_version_format: bool,
    ) -> Self {
        Self {
            prefix,
            primary_key,
            reverse,
            old_version_format,
            chunks: None,
            split: false,
            version: None,
            last_index: 0,
            sizes: StoredSizes::default(),
        }
    }

    /// Starts a record from its first scanned entry, deriving the record
    /// prefix by dropping the integer suffix from the entry key.
    pub(crate) fn begin_record(
        subspace: &Subspace,
        kv: &KeyValue,
        reverse: bool,
        old_version_format: bool,
    ) -> Result<(Self, bool)> {
        let shape = || SplitError::SubkeyShape {
            key: kv.key.clone(),
            prefix: subspace.raw().clone(),
        };
        let tuple = subspace.unpack(&kv.key)?;
        if tuple.is_empty() {
            return Err(shape());
        }
        let suffix = tuple.int(tuple.len() - 1).map_err(|_| shape())?;
        let primary_key = tuple.truncated(tuple.len() - 1);
        let prefix = subspace.pack(&primary_key);
        let mut acc = Self::new(prefix, primary_key, reverse, old_version_format);
        let complete = acc.append(suffix, kv)?;
        Ok((acc, complete))
    }

    /// The byte prefix shared by every entry of this record.
    pub(crate) fn prefix(&self) -> &Bytes {
        &self.prefix
    }

    /// Feeds the next entry of this record. Returns `true` when the entry
    /// completes the record in scan direction.
    pub(crate) fn append(&mut self, suffix: i64, kv: &KeyValue) -> Result<bool> {
        if suffix < VERSION_SUFFIX {
            return Err(self.without_start(suffix));
        }
        if suffix == VERSION_SUFFIX {
            return self.append_version(kv);
        }
        if self.reverse {
            self.append_data_reverse(suffix, kv)
        } else {
            self.append_data_forward(suffix, kv)
        }
    }

    fn append_version(&mut self, kv: &KeyValue) -> Result<bool> {
        if self.old_version_format {
            return Err(SplitError::OldVersionFormatViolation {
                prefix: self.prefix.clone(),
            });
        }
        if self.version.is_some() || (!self.reverse && self.chunks.is_some()) {
            // Keys are unique and the version entry sorts first in forward
            // order, so either condition means the scan handed us entries
            // out of order.
            return Err(self.without_start(VERSION_SUFFIX));
        }
        self.version = Some(layout::unpack_version(&kv.value)?);
        self.sizes.add_entry(&kv.key, &kv.value);
        self.sizes.versioned_inline = true;
        self.last_index = VERSION_SUFFIX;
        // In reverse the version entry is visited last and completes the
        // record; in forward order the data is still to come.
        Ok(self.reverse)
    }

    fn append_data_forward(&mut self, suffix: i64, kv: &KeyValue) -> Result<bool> {
        if suffix == UNSPLIT_SUFFIX {
            if self.chunks.is_some() {
                return Err(SplitError::MoreThanOneUnsplitValue {
                    prefix: self.prefix.clone(),
                    reverse: false,
                });
            }
            self.start_data(kv, false);
            return Ok(true);
        }
        match &mut self.chunks {
            None => {
                if suffix != START_SPLIT_SUFFIX {
                    return Err(self.without_start(suffix));
                }
                self.start_data(kv, true);
            }
            Some(chunks) => {
                if !self.split {
                    return Err(SplitError::UnsplitFollowedBySplit {
                        prefix: self.prefix.clone(),
                        index: suffix,
                        reverse: false,
                    });
                }
                let expected = self.last_index + 1;
                if suffix != expected {
                    return Err(SplitError::SplitSegmentsOutOfOrder {
                        prefix: self.prefix.clone(),
                        expected,
                        found: suffix,
                        reverse: false,
                    });
                }
                chunks.push(kv.value.clone());
                self.sizes.add_entry(&kv.key, &kv.value);
                self.last_index = suffix;
            }
        }
        Ok(false)
    }

    fn append_data_reverse(&mut self, suffix: i64, kv: &KeyValue) -> Result<bool> {
        if self.version.is_some() {
            // Data below the version entry in descending order cannot
            // belong to this record.
            return Err(self.without_start(suffix));
        }
        if suffix == UNSPLIT_SUFFIX {
            if self.chunks.is_some() {
                return Err(SplitError::UnsplitFollowedBySplit {
                    prefix: self.prefix.clone(),
                    index: self.last_index,
                    reverse: true,
                });
            }
            self.start_data(kv, false);
            return Ok(false);
        }
        match &mut self.chunks {
            None => {
                // The first chunk in reverse is the record's highest index.
                self.start_data(kv, true);
                self.last_index = suffix;
            }
            Some(chunks) => {
                if !self.split {
                    return Err(SplitError::UnsplitFollowedBySplit {
                        prefix: self.prefix.clone(),
                        index: suffix,
                        reverse: true,
                    });
                }
                let expected = self.last_index - 1;
                if suffix != expected {
                    return Err(SplitError::SplitSegmentsOutOfOrder {
                        prefix: self.prefix.clone(),
                        expected,
                        found: suffix,
                        reverse: true,
                    });
                }
                chunks.push(kv.value.clone());
                self.sizes.add_entry(&kv.key, &kv.value);
                self.last_index = suffix;
            }
        }
        Ok(false)
    }

    fn start_data(&mut self, kv: &KeyValue, split: bool) {
        self.chunks = Some(vec![kv.value.clone()]);
        self.split = split;
        self.sizes.add_entry(&kv.key, &kv.value);
        if !split {
            self.last_index = UNSPLIT_SUFFIX;
        } else if !self.reverse {
            self.last_index = START_SPLIT_SUFFIX;
        }
    }

    /// Validates the state when the record's entries ran out (prefix
    /// change or end of scan).
    ///
    /// Only reverse scans can detect a truncated record here: the lowest
    /// index seen must be the start chunk, an unsplit entry or a version.
    /// A forward scan cannot distinguish a truncated split tail from a
    /// complete record, since the chunk count is not stored.
    pub(crate) fn end_of_record(&self) -> Result<()> {
        if self.reverse && self.split && self.last_index > START_SPLIT_SUFFIX {
            return Err(self.without_start(self.last_index));
        }
        Ok(())
    }

    /// Completes the record: injects a transaction-local incomplete
    /// version if no durable version was read, and joins the payload.
    pub(crate) fn finish(mut self, tx: &Transaction) -> Result<Option<RawRecord>> {
        if !self.old_version_format && self.version.is_none() {
            if let Some(local) = tx.local_version(&self.prefix) {
                self.version = Some(Versionstamp::incomplete(local));
                self.sizes.versioned_inline = true;
                self.sizes.key_count += 1;
                self.sizes.key_size += layout::version_key(&self.prefix).len() as u64;
                self.sizes.value_size += (1 + VERSION_LENGTH) as u64;
            }
        }
        match self.chunks {
            None => {
                if self.version.is_some() {
                    // A bare version with no data is not a valid record.
                    Err(self.without_start(VERSION_SUFFIX))
                } else {
                    Ok(None)
                }
            }
            Some(mut chunks) => {
                if self.reverse {
                    chunks.reverse();
                }
                let payload = join_chunks(chunks);
                self.sizes.split = self.split;
                Ok(Some(RawRecord::new(
                    self.primary_key,
                    payload,
                    self.version,
                    self.sizes,
                )))
            }
        }
    }

    fn without_start(&self, index: i64) -> SplitError {
        SplitError::FoundSplitWithoutStart {
            prefix: self.prefix.clone(),
            index,
            reverse: self.reverse,
        }
    }
}

fn join_chunks(mut chunks: Vec<Bytes>) -> Bytes {
    if chunks.len() == 1 {
        return chunks.pop().expect("one chunk is present");
    }
    let total = chunks.iter().map(Bytes::len).sum();
    let mut joined = BytesMut::with_capacity(total);
    for chunk in chunks {
        joined.put_slice(&chunk);
    }
    joined.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamproite_kv::Database;
    use lamproite_tuple::Element;

    fn prefix() -> Bytes {
        Bytes::from_static(b"\x02rec\x00\x15\x01")
    }

    fn pk() -> Tuple {
        Tuple::new().with("rec").with(1i64)
    }

    fn entry(suffix: i64, value: &[u8]) -> KeyValue {
        KeyValue::new(layout::data_key(&prefix(), suffix), value.to_vec())
    }

    fn accumulator(reverse: bool) -> SplitAccumulator {
        SplitAccumulator::new(prefix(), pk(), reverse, false)
    }

    fn finish(acc: SplitAccumulator) -> Result<Option<RawRecord>> {
        let db = Database::new();
        let tx = db.transact();
        acc.finish(&tx)
    }

    #[test]
    fn forward_unsplit_completes_immediately() {
        let mut acc = accumulator(false);
        assert!(acc.append(UNSPLIT_SUFFIX, &entry(0, b"hello")).unwrap());
        let record = finish(acc).unwrap().unwrap();
        assert_eq!(record.payload(), &Bytes::from_static(b"hello"));
        assert!(!record.sizes().split);
    }

    #[test]
    fn forward_split_assembles_in_order() {
        let mut acc = accumulator(false);
        assert!(!acc.append(1, &entry(1, b"aa")).unwrap());
        assert!(!acc.append(2, &entry(2, b"bb")).unwrap());
        assert!(!acc.append(3, &entry(3, b"c")).unwrap());
        acc.end_of_record().unwrap();
        let record = finish(acc).unwrap().unwrap();
        assert_eq!(record.payload(), &Bytes::from_static(b"aabbc"));
        assert!(record.sizes().split);
        assert_eq!(record.sizes().key_count, 3);
    }

    #[test]
    fn forward_gap_reports_computed_expected_index() {
        let mut acc = accumulator(false);
        acc.append(1, &entry(1, b"aa")).unwrap();
        acc.append(2, &entry(2, b"bb")).unwrap();
        let err = acc.append(4, &entry(4, b"dd")).unwrap_err();
        assert!(matches!(
            err,
            SplitError::SplitSegmentsOutOfOrder {
                expected: 3,
                found: 4,
                reverse: false,
                ..
            }
        ));
    }

    #[test]
    fn forward_split_must_start_at_one() {
        let mut acc = accumulator(false);
        let err = acc.append(2, &entry(2, b"bb")).unwrap_err();
        assert!(matches!(
            err,
            SplitError::FoundSplitWithoutStart {
                index: 2,
                reverse: false,
                ..
            }
        ));
    }

    #[test]
    fn forward_unsplit_then_split_is_mixed() {
        let mut acc = accumulator(false);
        acc.append(0, &entry(0, b"u")).unwrap();
        let err = acc.append(1, &entry(1, b"s")).unwrap_err();
        assert!(matches!(err, SplitError::UnsplitFollowedBySplit { index: 1, .. }));
    }

    #[test]
    fn reverse_split_with_version_completes_on_version() {
        let version = Versionstamp::complete([7; 10], 0);
        let version_value = layout::pack_version(&version).unwrap();
        let mut acc = accumulator(true);
        assert!(!acc.append(2, &entry(2, b"bb")).unwrap());
        assert!(!acc.append(1, &entry(1, b"aa")).unwrap());
        assert!(
            acc.append(
                VERSION_SUFFIX,
                &KeyValue::new(layout::version_key(&prefix()), version_value),
            )
            .unwrap()
        );
        let record = finish(acc).unwrap().unwrap();
        assert_eq!(record.payload(), &Bytes::from_static(b"aabb"));
        assert_eq!(record.version(), Some(&version));
        assert!(record.sizes().versioned_inline);
    }

    #[test]
    fn reverse_truncated_record_is_detected_at_boundary() {
        let mut acc = accumulator(true);
        acc.append(3, &entry(3, b"cc")).unwrap();
        acc.append(2, &entry(2, b"bb")).unwrap();
        let err = acc.end_of_record().unwrap_err();
        assert!(matches!(
            err,
            SplitError::FoundSplitWithoutStart {
                index: 2,
                reverse: true,
                ..
            }
        ));
    }

    #[test]
    fn bare_version_is_rejected() {
        let version_value =
            layout::pack_version(&Versionstamp::complete([1; 10], 0)).unwrap();
        let mut acc = accumulator(false);
        acc.append(
            VERSION_SUFFIX,
            &KeyValue::new(layout::version_key(&prefix()), version_value),
        )
        .unwrap();
        let err = finish(acc).unwrap_err();
        assert!(matches!(
            err,
            SplitError::FoundSplitWithoutStart {
                index: VERSION_SUFFIX,
                ..
            }
        ));
    }

    #[test]
    fn old_version_format_rejects_version_entries() {
        let version_value =
            layout::pack_version(&Versionstamp::complete([1; 10], 0)).unwrap();
        let mut acc = SplitAccumulator::new(prefix(), pk(), false, true);
        let err = acc
            .append(
                VERSION_SUFFIX,
                &KeyValue::new(layout::version_key(&prefix()), version_value),
            )
            .unwrap_err();
        assert!(matches!(err, SplitError::OldVersionFormatViolation { .. }));
    }

    #[test]
    fn local_version_is_injected_when_no_durable_version_exists() {
        let db = Database::new();
        let mut tx = db.transact();
        tx.set_local_version(prefix(), 7);

        let mut acc = accumulator(false);
        acc.append(UNSPLIT_SUFFIX, &entry(0, b"x")).unwrap();
        let record = acc.finish(&tx).unwrap().unwrap();
        assert_eq!(record.version(), Some(&Versionstamp::incomplete(7)));
        let sizes = record.sizes();
        assert!(sizes.versioned_inline);
        assert_eq!(sizes.key_count, 2);
        assert_eq!(
            sizes.value_size,
            1 + (1 + VERSION_LENGTH) as u64
        );
    }

    #[test]
    fn begin_record_derives_prefix_from_first_entry() {
        let subspace = Subspace::new(Bytes::from_static(b"\x01"));
        let key = {
            let mut t = pk();
            t.push(Element::Int(UNSPLIT_SUFFIX));
            subspace.pack(&t)
        };
        let kv = KeyValue::new(key, b"payload".to_vec());
        let (acc, complete) =
            SplitAccumulator::begin_record(&subspace, &kv, false, false).unwrap();
        assert!(complete);
        assert_eq!(acc.prefix(), &subspace.pack(&pk()));
    }
}
