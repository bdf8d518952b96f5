//! Streaming reassembly of records from an unbounded range scan.

use lamproite_kv::{
    Continuation, KeyValue, KvError, NoNextReason, RecordCursor, ScanLimiter, Transaction,
};
use lamproite_tuple::Subspace;

use crate::accumulator::SplitAccumulator;
use crate::layout;
use crate::record::RawRecord;
use crate::{Result, SplitError};

/// Reassembles a lazy sequence of records from an inner entry cursor.
///
/// Adjacent entries are grouped by record prefix: an entry whose key no
/// longer matches the current record's prefix finishes that record and is
/// held as look-ahead for the next one. The scan budget is consulted only
/// between records — a record that has begun accumulating is always
/// finished, however many entries that takes — so a scan never halts
/// inside a split record.
///
/// The continuation stored after each emitted record belongs to the last
/// inner entry consumed into that record, so resuming a scan from it
/// re-reads no bytes of anything already emitted.
pub struct SplitRecordCursor<'t, C> {
    tx: &'t Transaction,
    subspace: Subspace,
    inner: C,
    reverse: bool,
    old_version_format: bool,
    limiter: ScanLimiter,
    /// Where the inner scan was resumed from; reported if the budget
    /// stops the cursor before any progress.
    start: Continuation,
    /// Look-ahead entry whose prefix ended the previous record, plus the
    /// continuation captured after it.
    pending: Option<(KeyValue, Continuation)>,
    /// Set once the inner cursor reports no-next.
    inner_no_next: Option<(NoNextReason, Continuation)>,
    /// Continuation for the most recent `on_next` result; `None` until
    /// the first result (accessing it then is a caller bug).
    exposed: Option<Continuation>,
    done: Option<NoNextReason>,
}

impl<'t, C> SplitRecordCursor<'t, C>
where
    C: RecordCursor<Item = KeyValue, Error = KvError>,
{
    /// Creates a streaming reader over `inner`, whose entries must lie in
    /// `subspace` and arrive in scan order (descending when `reverse`).
    pub fn new(
        tx: &'t Transaction,
        subspace: Subspace,
        inner: C,
        reverse: bool,
        old_version_format: bool,
        limiter: ScanLimiter,
    ) -> Self {
        Self {
            tx,
            subspace,
            inner,
            reverse,
            old_version_format,
            limiter,
            start: Continuation::begin(),
            pending: None,
            inner_no_next: None,
            exposed: None,
            done: None,
        }
    }

    /// Records the continuation the inner scan was resumed from, so a
    /// budget stop before any progress resumes at the same position.
    pub fn resumed_from(mut self, continuation: Continuation) -> Self {
        self.start = continuation;
        self
    }

    /// The scan budget, for inspection.
    pub fn limiter(&self) -> &ScanLimiter {
        &self.limiter
    }

    fn emit(
        &mut self,
        acc: SplitAccumulator,
        continuation: Continuation,
    ) -> Result<Option<RawRecord>> {
        let record = acc
            .finish(self.tx)?
            .expect("a record with at least one entry has payload or version");
        self.exposed = Some(continuation);
        Ok(Some(record))
    }

    /// Terminates the stream once the inner cursor has stopped. The
    /// reported reason gives source exhaustion priority, then the budget,
    /// then the inner cursor's own limit.
    fn finish_stream(
        &mut self,
        inner_reason: NoNextReason,
        inner_continuation: Continuation,
    ) -> Result<Option<RawRecord>> {
        let reason = if inner_reason.is_source_exhausted() {
            NoNextReason::SourceExhausted
        } else if let Some(budget) = self.limiter.stopped_reason() {
            budget
        } else {
            inner_reason
        };
        self.done = Some(reason);
        self.exposed = Some(if reason.is_source_exhausted() {
            Continuation::end()
        } else {
            inner_continuation
        });
        Ok(None)
    }
}

impl<C> RecordCursor for SplitRecordCursor<'_, C>
where
    C: RecordCursor<Item = KeyValue, Error = KvError>,
{
    type Item = RawRecord;
    type Error = SplitError;

    fn on_next(&mut self) -> Result<Option<RawRecord>> {
        if self.done.is_some() {
            return Ok(None);
        }
        if let Some((reason, continuation)) = self.inner_no_next.clone() {
            // The previous call emitted the final record; report why the
            // stream ends.
            return self.finish_stream(reason, continuation);
        }
        if let Some(reason) = self.limiter.stopped_reason() {
            // The budget is consulted only here, between records; the
            // previous record (if any) was emitted in full.
            tracing::debug!(
                keys_scanned = self.limiter.keys_scanned(),
                reason = ?reason,
                "scan budget exhausted between records"
            );
            self.done = Some(reason);
            if self.exposed.is_none() {
                self.exposed = Some(self.start.clone());
            }
            return Ok(None);
        }

        // The look-ahead entry from the previous record boundary starts
        // the next record; it may even complete it (a forward unsplit).
        let mut current: Option<(SplitAccumulator, Continuation)> = None;
        if let Some((kv, continuation)) = self.pending.take() {
            let (acc, complete) = SplitAccumulator::begin_record(
                &self.subspace,
                &kv,
                self.reverse,
                self.old_version_format,
            )?;
            if complete {
                return self.emit(acc, continuation);
            }
            current = Some((acc, continuation));
        }

        loop {
            match self.inner.on_next()? {
                None => {
                    let reason = self
                        .inner
                        .no_next_reason()
                        .expect("inner cursor stopped without a reason");
                    let continuation = self.inner.continuation()?;
                    self.inner_no_next = Some((reason, continuation.clone()));
                    match current {
                        Some((acc, record_continuation)) => {
                            if !reason.is_source_exhausted() {
                                tracing::debug!(
                                    reason = ?reason,
                                    "inner cursor stopped mid-record"
                                );
                            }
                            acc.end_of_record()?;
                            return self.emit(acc, record_continuation);
                        }
                        None => return self.finish_stream(reason, continuation),
                    }
                }
                Some(kv) => {
                    let continuation = self.inner.continuation()?;
                    self.limiter.try_record_scan(kv.key.len() + kv.value.len());
                    match current.take() {
                        None => {
                            let (acc, complete) = SplitAccumulator::begin_record(
                                &self.subspace,
                                &kv,
                                self.reverse,
                                self.old_version_format,
                            )?;
                            if complete {
                                return self.emit(acc, continuation);
                            }
                            current = Some((acc, continuation));
                        }
                        Some((mut acc, record_continuation)) => {
                            if kv.key.starts_with(acc.prefix()) {
                                let suffix = layout::parse_suffix(&kv.key, acc.prefix())?;
                                let complete = acc.append(suffix, &kv)?;
                                if complete {
                                    return self.emit(acc, continuation);
                                }
                                current = Some((acc, continuation));
                            } else {
                                // Prefix boundary: this entry belongs to
                                // the next record. Hold it and finish the
                                // current one.
                                acc.end_of_record()?;
                                self.pending = Some((kv, continuation));
                                return self.emit(acc, record_continuation);
                            }
                        }
                    }
                }
            }
        }
    }

    fn continuation(&self) -> Result<Continuation> {
        self.exposed
            .clone()
            .ok_or(SplitError::Kv(KvError::IllegalContinuationAccess))
    }

    fn no_next_reason(&self) -> Option<NoNextReason> {
        self.done
    }

    fn close(&mut self) {
        self.inner.close();
    }
}
