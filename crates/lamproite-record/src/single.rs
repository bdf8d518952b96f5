//! Single-record reads.

use lamproite_kv::{RecordCursor, ScanProperties, Transaction};
use lamproite_tuple::{Subspace, Tuple, prefix_range};

use crate::accumulator::SplitAccumulator;
use crate::layout;
use crate::record::RawRecord;
use crate::sizes::StoredSizes;
use crate::Result;

/// How records under a subspace are laid out, from the reader's side.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFormat {
    /// Whether records may be split across entries.
    pub split_long_records: bool,
    /// Legacy layout: unsplit records live at the bare prefix with no
    /// suffix.
    pub missing_unsplit_record_suffix: bool,
    /// Versionless legacy format: any version entry is a corruption.
    pub old_version_format: bool,
}

/// Loads the record under `primary_key`, reassembling it from however
/// many entries it occupies.
///
/// Returns `None` if no record exists. Within the writing transaction, a
/// record saved with an incomplete version reads back with that version
/// synthesized from transaction-local state.
pub fn load(
    tx: &Transaction,
    subspace: &Subspace,
    primary_key: &Tuple,
    format: &RecordFormat,
) -> Result<Option<RawRecord>> {
    let key_bytes = subspace.pack(primary_key);

    if !format.split_long_records && format.missing_unsplit_record_suffix {
        // Legacy direct path: the record is the bare key, point-read it.
        return Ok(tx.get(&key_bytes).map(|value| {
            let mut sizes = StoredSizes::default();
            sizes.set_entry(&key_bytes, &value);
            RawRecord::new(primary_key.clone(), value, None, sizes)
        }));
    }

    let (begin, end) = prefix_range(&key_bytes)?;
    let mut cursor = tx.scan(&begin, &end, &ScanProperties::forward())?;
    let mut acc = SplitAccumulator::new(
        key_bytes.clone(),
        primary_key.clone(),
        false,
        format.old_version_format,
    );
    while let Some(kv) = cursor.on_next()? {
        let suffix = layout::parse_suffix(&kv.key, &key_bytes)?;
        acc.append(suffix, &kv)?;
    }
    acc.end_of_record()?;
    acc.finish(tx)
}

/// Returns `true` if a record exists under `primary_key`.
pub fn exists(
    tx: &Transaction,
    subspace: &Subspace,
    primary_key: &Tuple,
    format: &RecordFormat,
) -> Result<bool> {
    let key_bytes = subspace.pack(primary_key);
    if !format.split_long_records && format.missing_unsplit_record_suffix {
        return Ok(tx.get(&key_bytes).is_some());
    }
    let (begin, end) = prefix_range(&key_bytes)?;
    let mut cursor = tx.scan(&begin, &end, &ScanProperties::forward().with_limit(1))?;
    Ok(cursor.on_next()?.is_some())
}
