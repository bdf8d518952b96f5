//! Scan cursors, continuations and termination reasons.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{KvError, Result};

/// One key-value pair produced by a range scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// The full key, including any namespace prefix.
    pub key: Bytes,
    /// The stored value.
    pub value: Bytes,
}

impl KeyValue {
    /// Creates a key-value pair.
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Why a cursor stopped producing items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoNextReason {
    /// The underlying range was fully consumed.
    SourceExhausted,
    /// The cursor's own row limit was reached.
    ReturnLimitReached,
    /// The scan budget's key allowance was used up.
    KeyScanLimitReached,
    /// The scan budget's byte allowance was used up.
    ByteScanLimitReached,
}

impl NoNextReason {
    /// Returns `true` if the range itself ran out (resuming will produce
    /// nothing further).
    pub fn is_source_exhausted(self) -> bool {
        matches!(self, NoNextReason::SourceExhausted)
    }

    /// Returns `true` if an out-of-band limit stopped the cursor before
    /// the range was exhausted.
    pub fn is_limit_reached(self) -> bool {
        !self.is_source_exhausted()
    }
}

/// An opaque resume position for a range scan.
///
/// A continuation is valid to hand to a fresh scan over the same range
/// and direction; the scan resumes just past the item the continuation
/// was captured after. Continuations are captured from a cursor only in
/// the window immediately following an `on_next` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation(Resume);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Resume {
    /// Start of the range; nothing consumed yet.
    Begin,
    /// Resume just past this key (scan-direction-relative).
    After(Vec<u8>),
    /// The range was exhausted; resuming yields nothing.
    End,
}

impl Continuation {
    /// A continuation that restarts the scan from the beginning.
    pub fn begin() -> Self {
        Continuation(Resume::Begin)
    }

    /// A continuation that resumes just past `key` in scan order.
    pub fn after(key: &[u8]) -> Self {
        Continuation(Resume::After(key.to_vec()))
    }

    /// A terminal continuation: the scan was exhausted.
    pub fn end() -> Self {
        Continuation(Resume::End)
    }

    /// Returns `true` if resuming from this continuation yields nothing.
    pub fn is_end(&self) -> bool {
        matches!(self.0, Resume::End)
    }

    /// Returns the key this continuation resumes after, if any.
    pub(crate) fn resume_after(&self) -> Option<&[u8]> {
        match &self.0 {
            Resume::After(key) => Some(key),
            _ => None,
        }
    }

    /// Serializes the continuation to its opaque wire form.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(postcard::to_allocvec(&self.0).expect("continuation serialization is infallible"))
    }

    /// Deserializes a continuation from its opaque wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        postcard::from_bytes(bytes)
            .map(Continuation)
            .map_err(|e| KvError::InvalidContinuation {
                reason: e.to_string(),
            })
    }
}

/// Options governing a range scan.
#[derive(Debug, Clone, Default)]
pub struct ScanProperties {
    /// Scan in descending key order.
    pub reverse: bool,
    /// Maximum number of rows to return before reporting
    /// [`NoNextReason::ReturnLimitReached`]. `None` means "want all".
    pub limit: Option<usize>,
    /// Resume position from a prior scan over the same range.
    pub continuation: Option<Continuation>,
}

impl ScanProperties {
    /// Properties for a full forward scan.
    pub fn forward() -> Self {
        Self::default()
    }

    /// Properties for a full reverse scan.
    pub fn reverse() -> Self {
        Self {
            reverse: true,
            ..Self::default()
        }
    }

    /// Sets the row limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the resume position.
    pub fn with_continuation(mut self, continuation: Continuation) -> Self {
        self.continuation = Some(continuation);
        self
    }
}

/// The capability interface of a resumable cursor.
///
/// Implementations produce items with [`on_next`](Self::on_next) until a
/// terminal `None`, after which [`no_next_reason`](Self::no_next_reason)
/// explains the stop. [`continuation`](Self::continuation) may be called
/// only immediately after `on_next` returned — either an item (the
/// continuation resumes past it) or the terminal `None` (the continuation
/// resumes where the cursor stopped). Any earlier access is a caller bug
/// and fails with [`KvError::IllegalContinuationAccess`].
pub trait RecordCursor {
    /// The item type this cursor produces.
    type Item;

    /// The error type this cursor fails with.
    type Error;

    /// Produces the next item, or `None` when the cursor stops.
    fn on_next(&mut self) -> std::result::Result<Option<Self::Item>, Self::Error>;

    /// Returns the resume position for the most recent `on_next` result.
    fn continuation(&self) -> std::result::Result<Continuation, Self::Error>;

    /// Returns why the cursor stopped, once it has.
    fn no_next_reason(&self) -> Option<NoNextReason>;

    /// Releases underlying resources. Continuations captured before the
    /// close remain valid.
    fn close(&mut self) {}
}

/// A range scan cursor over a transaction's view.
///
/// The cursor owns its result set (captured from the transaction view at
/// scan time) and walks it in scan order, honoring an optional row limit
/// and producing a continuation after every item.
#[derive(Debug)]
pub struct KeyValueCursor {
    entries: std::vec::IntoIter<KeyValue>,
    limit: Option<usize>,
    emitted: usize,
    start: Continuation,
    last: Option<Continuation>,
    no_next: Option<NoNextReason>,
}

impl KeyValueCursor {
    pub(crate) fn new(entries: Vec<KeyValue>, start: Continuation, limit: Option<usize>) -> Self {
        Self {
            entries: entries.into_iter(),
            limit,
            emitted: 0,
            start,
            last: None,
            no_next: None,
        }
    }
}

impl RecordCursor for KeyValueCursor {
    type Item = KeyValue;
    type Error = KvError;

    fn on_next(&mut self) -> Result<Option<KeyValue>> {
        if self.no_next.is_some() {
            return Ok(None);
        }
        if self.limit.is_some_and(|limit| self.emitted >= limit) {
            self.no_next = Some(NoNextReason::ReturnLimitReached);
            if self.last.is_none() {
                self.last = Some(self.start.clone());
            }
            return Ok(None);
        }
        match self.entries.next() {
            Some(kv) => {
                self.emitted += 1;
                self.last = Some(Continuation::after(&kv.key));
                Ok(Some(kv))
            }
            None => {
                self.no_next = Some(NoNextReason::SourceExhausted);
                self.last = Some(Continuation::end());
                Ok(None)
            }
        }
    }

    fn continuation(&self) -> Result<Continuation> {
        self.last.clone().ok_or(KvError::IllegalContinuationAccess)
    }

    fn no_next_reason(&self) -> Option<NoNextReason> {
        self.no_next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(keys: &[&[u8]]) -> Vec<KeyValue> {
        keys.iter()
            .map(|k| KeyValue::new(k.to_vec(), b"v".to_vec()))
            .collect()
    }

    #[test]
    fn drains_and_reports_exhaustion() {
        let mut cursor = KeyValueCursor::new(entries(&[b"a", b"b"]), Continuation::begin(), None);
        assert_eq!(cursor.on_next().unwrap().unwrap().key, Bytes::from_static(b"a"));
        assert_eq!(cursor.continuation().unwrap(), Continuation::after(b"a"));
        assert_eq!(cursor.on_next().unwrap().unwrap().key, Bytes::from_static(b"b"));
        assert!(cursor.on_next().unwrap().is_none());
        assert_eq!(cursor.no_next_reason(), Some(NoNextReason::SourceExhausted));
        assert!(cursor.continuation().unwrap().is_end());
    }

    #[test]
    fn row_limit_stops_with_resumable_continuation() {
        let mut cursor =
            KeyValueCursor::new(entries(&[b"a", b"b", b"c"]), Continuation::begin(), Some(2));
        cursor.on_next().unwrap().unwrap();
        cursor.on_next().unwrap().unwrap();
        assert!(cursor.on_next().unwrap().is_none());
        assert_eq!(cursor.no_next_reason(), Some(NoNextReason::ReturnLimitReached));
        assert_eq!(cursor.continuation().unwrap(), Continuation::after(b"b"));
    }

    #[test]
    fn continuation_before_first_next_is_rejected() {
        let cursor = KeyValueCursor::new(entries(&[b"a"]), Continuation::begin(), None);
        assert!(matches!(
            cursor.continuation(),
            Err(KvError::IllegalContinuationAccess)
        ));
    }

    #[test]
    fn continuation_wire_roundtrip() {
        for c in [
            Continuation::begin(),
            Continuation::after(b"some-key"),
            Continuation::end(),
        ] {
            assert_eq!(Continuation::from_bytes(&c.to_bytes()).unwrap(), c);
        }
    }
}
