//! Transactions: snapshot view, ordered mutation log, commit resolution.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};
use lamproite_tuple::TR_VERSION_LEN;

use crate::cursor::{Continuation, KeyValue, KeyValueCursor, ScanProperties};
use crate::database::{CommitStamp, Committed, Database};
use crate::{KvError, Result};

/// Width of the little-endian offset tail on a versionstamped value.
const OFFSET_TAIL_LEN: usize = 4;

#[derive(Debug, Clone)]
enum Mutation {
    Set { key: Bytes, value: Bytes },
    Clear { key: Bytes },
    ClearRange { begin: Bytes, end: Bytes },
    SetVersionstamped { key: Bytes, value: Bytes },
}

/// A transaction over the store.
///
/// Reads see the snapshot taken at creation plus this transaction's own
/// plain writes (read-your-writes). Versionstamped-value mutations are
/// the exception: they stay invisible to in-transaction reads because
/// their final bytes do not exist until commit. Callers that need to
/// observe such a pending version register it in the transaction-local
/// version cache and synthesize it on read.
///
/// Mutations are buffered in order and replayed against the committed
/// state when [`commit`](Self::commit) consumes the transaction, so a
/// range clear issued after a versionstamped write correctly wipes it.
#[derive(Debug)]
pub struct Transaction {
    store: Arc<Mutex<Committed>>,
    view: BTreeMap<Bytes, Bytes>,
    log: Vec<Mutation>,
    local_versions: HashMap<Bytes, u16>,
}

impl Transaction {
    pub(crate) fn new(store: Arc<Mutex<Committed>>, snapshot: BTreeMap<Bytes, Bytes>) -> Self {
        Self {
            store,
            view: snapshot,
            log: Vec::new(),
            local_versions: HashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Point read from the transaction's view.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.view.get(key).cloned()
    }

    /// Range scan over `[begin, end)` in the transaction's view.
    pub fn scan(&self, begin: &[u8], end: &[u8], props: &ScanProperties) -> Result<KeyValueCursor> {
        let mut begin = Bytes::copy_from_slice(begin);
        let mut end = Bytes::copy_from_slice(end);
        let start = props.continuation.clone().unwrap_or_else(Continuation::begin);
        if start.is_end() {
            return Ok(KeyValueCursor::new(Vec::new(), start, props.limit));
        }
        if let Some(last) = start.resume_after() {
            if props.reverse {
                // Resume below the last consumed key.
                end = end.min(Bytes::copy_from_slice(last));
            } else {
                // Resume just past the last consumed key.
                begin = begin.max(key_successor(last));
            }
        }
        let mut entries: Vec<KeyValue> = self
            .view
            .range((Bound::Included(begin), Bound::Excluded(end)))
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect();
        if props.reverse {
            entries.reverse();
        }
        Ok(KeyValueCursor::new(entries, start, props.limit))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Sets `key` to `value`.
    pub fn set(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        let (key, value) = (key.into(), value.into());
        self.view.insert(key.clone(), value.clone());
        self.log.push(Mutation::Set { key, value });
    }

    /// Clears a single key.
    pub fn clear(&mut self, key: impl Into<Bytes>) {
        let key = key.into();
        self.view.remove(&key);
        self.log.push(Mutation::Clear { key });
    }

    /// Clears every key in `[begin, end)`.
    pub fn clear_range(&mut self, begin: impl Into<Bytes>, end: impl Into<Bytes>) {
        let (begin, end) = (begin.into(), end.into());
        let doomed: Vec<Bytes> = self
            .view
            .range((Bound::Included(begin.clone()), Bound::Excluded(end.clone())))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            self.view.remove(&key);
        }
        self.log.push(Mutation::ClearRange { begin, end });
    }

    /// Submits a versionstamped-value mutation.
    ///
    /// `value` must end in a 4-byte little-endian offset pointing at ten
    /// placeholder bytes within the value; the placeholder is replaced by
    /// the commit stamp and the tail stripped when the transaction
    /// commits. The mutation is not visible to reads in this transaction.
    pub fn set_versionstamped_value(
        &mut self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        versionstamp_offset(&value)?;
        self.log.push(Mutation::SetVersionstamped { key, value });
        Ok(())
    }

    /// Drops any pending versionstamped-value mutation targeting `key`.
    pub fn remove_version_mutation(&mut self, key: &[u8]) {
        self.log
            .retain(|m| !matches!(m, Mutation::SetVersionstamped { key: k, .. } if k == key));
    }

    // ------------------------------------------------------------------
    // Transaction-local version cache
    // ------------------------------------------------------------------

    /// Registers the local ordinal of a not-yet-durable version for the
    /// record at `key`.
    pub fn set_local_version(&mut self, key: impl Into<Bytes>, local_version: u16) {
        self.local_versions.insert(key.into(), local_version);
    }

    /// Looks up the local ordinal registered for the record at `key`.
    pub fn local_version(&self, key: &[u8]) -> Option<u16> {
        self.local_versions.get(key).copied()
    }

    /// Unregisters the local ordinal for the record at `key`.
    pub fn clear_local_version(&mut self, key: &[u8]) {
        self.local_versions.remove(key);
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// Commits the transaction, replaying its mutation log against the
    /// committed state and resolving versionstamped values.
    pub fn commit(self) -> Result<CommitStamp> {
        let mut committed = Database::lock_inner(&self.store);
        committed.version += 1;
        let stamp = CommitStamp::new(committed.version, 0);
        tracing::debug!(
            version = stamp.version(),
            mutations = self.log.len(),
            "committing transaction"
        );
        for mutation in self.log {
            match mutation {
                Mutation::Set { key, value } => {
                    committed.map.insert(key, value);
                }
                Mutation::Clear { key } => {
                    committed.map.remove(&key);
                }
                Mutation::ClearRange { begin, end } => {
                    let doomed: Vec<Bytes> = committed
                        .map
                        .range((Bound::Included(begin), Bound::Excluded(end)))
                        .map(|(k, _)| k.clone())
                        .collect();
                    for key in doomed {
                        committed.map.remove(&key);
                    }
                }
                Mutation::SetVersionstamped { key, value } => {
                    let resolved = resolve_versionstamped(&value, &stamp)?;
                    committed.map.insert(key, resolved);
                }
            }
        }
        Ok(stamp)
    }
}

/// The smallest key strictly greater than `key`.
fn key_successor(key: &[u8]) -> Bytes {
    let mut succ = BytesMut::with_capacity(key.len() + 1);
    succ.put_slice(key);
    succ.put_u8(0x00);
    succ.freeze()
}

/// Validates the offset tail of a versionstamped value and returns the
/// placeholder offset.
fn versionstamp_offset(value: &[u8]) -> Result<usize> {
    let malformed = |offset: u32| KvError::MalformedVersionstampedValue {
        len: value.len(),
        offset,
    };
    if value.len() < OFFSET_TAIL_LEN {
        return Err(malformed(0));
    }
    let tail = value.len() - OFFSET_TAIL_LEN;
    let offset = u32::from_le_bytes(value[tail..].try_into().expect("tail is 4 bytes"));
    if offset as usize + TR_VERSION_LEN > tail {
        return Err(malformed(offset));
    }
    Ok(offset as usize)
}

fn resolve_versionstamped(value: &[u8], stamp: &CommitStamp) -> Result<Bytes> {
    let offset = versionstamp_offset(value)?;
    let mut resolved = value[..value.len() - OFFSET_TAIL_LEN].to_vec();
    resolved[offset..offset + TR_VERSION_LEN].copy_from_slice(stamp.as_bytes());
    Ok(Bytes::from(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{NoNextReason, RecordCursor};

    fn collect(cursor: &mut KeyValueCursor) -> Vec<Bytes> {
        let mut keys = Vec::new();
        while let Some(kv) = cursor.on_next().unwrap() {
            keys.push(kv.key);
        }
        keys
    }

    #[test]
    fn read_your_writes() {
        let db = Database::new();
        let mut tx = db.transact();
        tx.set(&b"a"[..], &b"1"[..]);
        assert_eq!(tx.get(b"a"), Some(Bytes::from_static(b"1")));
        tx.clear(&b"a"[..]);
        assert_eq!(tx.get(b"a"), None);
    }

    #[test]
    fn commit_replays_in_order() {
        let db = Database::new();
        let mut tx = db.transact();
        tx.set(&b"a"[..], &b"1"[..]);
        tx.set(&b"b"[..], &b"2"[..]);
        tx.clear_range(&b"a"[..], &b"b"[..]);
        tx.commit().unwrap();

        let tx = db.transact();
        assert_eq!(tx.get(b"a"), None);
        assert_eq!(tx.get(b"b"), Some(Bytes::from_static(b"2")));
    }

    #[test]
    fn versionstamped_value_resolves_at_commit() {
        let db = Database::new();
        let mut tx = db.transact();
        // 1 prefix byte, 10 placeholder bytes, 2 user bytes, 4 tail bytes.
        let mut value = vec![0x33];
        value.extend_from_slice(&[0xFF; 10]);
        value.extend_from_slice(&[0x00, 0x07]);
        value.extend_from_slice(&1u32.to_le_bytes());
        tx.set_versionstamped_value(&b"k"[..], value).unwrap();

        // Invisible before commit.
        assert_eq!(tx.get(b"k"), None);

        let stamp = tx.commit().unwrap();
        let tx = db.transact();
        let stored = tx.get(b"k").unwrap();
        assert_eq!(stored.len(), 13);
        assert_eq!(&stored[1..11], stamp.as_bytes());
        assert_eq!(&stored[11..], &[0x00, 0x07]);
    }

    #[test]
    fn malformed_versionstamped_value_rejected() {
        let db = Database::new();
        let mut tx = db.transact();
        // Offset points past the end of the durable portion.
        let mut value = vec![0u8; 6];
        value.extend_from_slice(&5u32.to_le_bytes());
        assert!(matches!(
            tx.set_versionstamped_value(&b"k"[..], value),
            Err(KvError::MalformedVersionstampedValue { .. })
        ));
    }

    #[test]
    fn remove_version_mutation_drops_pending_write() {
        let db = Database::new();
        let mut tx = db.transact();
        let mut value = vec![0xFF; 10];
        value.extend_from_slice(&0u32.to_le_bytes());
        tx.set_versionstamped_value(&b"k"[..], value).unwrap();
        tx.remove_version_mutation(b"k");
        tx.commit().unwrap();
        assert!(db.is_empty());
    }

    #[test]
    fn scan_forward_reverse_and_resume() {
        let db = Database::new();
        let mut tx = db.transact();
        for k in [b"a", b"b", b"c", b"d"] {
            tx.set(&k[..], &b"v"[..]);
        }

        let mut forward = tx.scan(b"a", b"z", &ScanProperties::forward()).unwrap();
        assert_eq!(collect(&mut forward), vec!["a", "b", "c", "d"]);

        let mut reverse = tx.scan(b"a", b"z", &ScanProperties::reverse()).unwrap();
        assert_eq!(collect(&mut reverse), vec!["d", "c", "b", "a"]);

        // Resume a forward scan after "b".
        let mut limited = tx
            .scan(b"a", b"z", &ScanProperties::forward().with_limit(2))
            .unwrap();
        limited.on_next().unwrap();
        limited.on_next().unwrap();
        assert!(limited.on_next().unwrap().is_none());
        assert_eq!(
            limited.no_next_reason(),
            Some(NoNextReason::ReturnLimitReached)
        );
        let resume = limited.continuation().unwrap();
        let mut resumed = tx
            .scan(b"a", b"z", &ScanProperties::forward().with_continuation(resume))
            .unwrap();
        assert_eq!(collect(&mut resumed), vec!["c", "d"]);

        // Resume a reverse scan after "c" (scan order d, c, ...).
        let mut rev = tx
            .scan(b"a", b"z", &ScanProperties::reverse().with_limit(2))
            .unwrap();
        rev.on_next().unwrap();
        rev.on_next().unwrap();
        assert!(rev.on_next().unwrap().is_none());
        let resume = rev.continuation().unwrap();
        let mut resumed = tx
            .scan(b"a", b"z", &ScanProperties::reverse().with_continuation(resume))
            .unwrap();
        assert_eq!(collect(&mut resumed), vec!["b", "a"]);
    }

    #[test]
    fn local_version_cache() {
        let db = Database::new();
        let mut tx = db.transact();
        tx.set_local_version(&b"pk"[..], 7);
        assert_eq!(tx.local_version(b"pk"), Some(7));
        tx.clear_local_version(b"pk");
        assert_eq!(tx.local_version(b"pk"), None);
    }
}
