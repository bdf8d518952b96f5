//! The committed store and commit stamps.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use lamproite_tuple::TR_VERSION_LEN;

use crate::transaction::Transaction;

/// The 10-byte stamp assigned to a transaction at commit.
///
/// Eight big-endian bytes of commit version followed by two big-endian
/// bytes of batch order, so stamps compare in commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitStamp([u8; TR_VERSION_LEN]);

impl CommitStamp {
    pub(crate) fn new(version: u64, batch: u16) -> Self {
        let mut bytes = [0u8; TR_VERSION_LEN];
        bytes[..8].copy_from_slice(&version.to_be_bytes());
        bytes[8..].copy_from_slice(&batch.to_be_bytes());
        Self(bytes)
    }

    /// Returns the raw 10-byte stamp.
    pub fn as_bytes(&self) -> &[u8; TR_VERSION_LEN] {
        &self.0
    }

    /// Returns the commit version portion.
    pub fn version(&self) -> u64 {
        u64::from_be_bytes(self.0[..8].try_into().expect("stamp holds 8 version bytes"))
    }
}

#[derive(Debug, Default)]
pub(crate) struct Committed {
    pub(crate) map: BTreeMap<Bytes, Bytes>,
    pub(crate) version: u64,
}

/// An ordered, transactional, in-memory key-value store.
///
/// All access goes through [`Transaction`]s: a transaction captures a
/// snapshot of the committed state at creation, buffers mutations in
/// order, and replays them against the committed state at commit. Commits
/// are assigned monotonically increasing versions which resolve
/// versionstamped-value mutations.
#[derive(Debug, Clone, Default)]
pub struct Database {
    inner: Arc<Mutex<Committed>>,
}

impl Database {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a transaction over a snapshot of the current committed
    /// state.
    pub fn transact(&self) -> Transaction {
        let snapshot = self.lock().map.clone();
        Transaction::new(Arc::clone(&self.inner), snapshot)
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    /// Returns `true` if the committed state is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn lock_inner(inner: &Arc<Mutex<Committed>>) -> MutexGuard<'_, Committed> {
        inner
            .lock()
            .expect("another thread holding the store lock panicked")
    }

    fn lock(&self) -> MutexGuard<'_, Committed> {
        Self::lock_inner(&self.inner)
    }
}
