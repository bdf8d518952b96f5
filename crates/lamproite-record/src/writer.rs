//! Saving and deleting records.
//!
//! A save emits one unsplit entry for a small payload, or one entry per
//! chunk for a large payload, plus up to one version entry. Overwrites
//! clear the previous record first; when the caller supplies the previous
//! save's [`StoredSizes`], the clear shrinks to the minimum the old
//! layout requires.

use bytes::Bytes;
use lamproite_kv::Transaction;
use lamproite_tuple::{Subspace, Tuple, Versionstamp, prefix_range};

use crate::layout::{
    self, CHUNK_SIZE, START_SPLIT_SUFFIX, UNSPLIT_SUFFIX, VERSION_LENGTH,
};
use crate::sizes::StoredSizes;
use crate::{Result, SplitError};

/// Options governing a save.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Allow payloads above the chunk threshold, splitting them across
    /// entries. When `false`, an oversize payload fails with
    /// [`SplitError::RecordTooLong`].
    pub split_long_records: bool,
    /// Legacy layout: write the single entry at the bare prefix with no
    /// suffix. Requires `split_long_records = false` and no version.
    pub omit_unsplit_suffix: bool,
    /// Trust `previous_sizes` to compute the minimal clear for the old
    /// record. When `false` the whole prefix range is always cleared.
    pub clear_based_on_previous: bool,
    /// The counters returned by the previous save of this record, if the
    /// caller tracked them. `None` means "fresh write" when
    /// `clear_based_on_previous` is set.
    pub previous_sizes: Option<StoredSizes>,
}

/// Options governing a delete.
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Whether records in this store may be split.
    pub split_long_records: bool,
    /// Legacy layout: the record lives at the bare prefix with no suffix.
    pub missing_unsplit_record_suffix: bool,
    /// Trust `previous_sizes` to compute the minimal clear.
    pub clear_based_on_previous: bool,
    /// The counters returned by the previous save, if tracked.
    pub previous_sizes: Option<StoredSizes>,
}

/// Saves a record, overwriting any previous record under the same key.
///
/// Returns the [`StoredSizes`] describing what was written; passing them
/// back as [`SaveOptions::previous_sizes`] on the next save enables the
/// minimal-overwrite clear.
pub fn save(
    tx: &mut Transaction,
    subspace: &Subspace,
    primary_key: &Tuple,
    payload: impl Into<Bytes>,
    version: Option<Versionstamp>,
    options: &SaveOptions,
) -> Result<StoredSizes> {
    let payload = payload.into();
    let key_bytes = subspace.pack(primary_key);
    if options.omit_unsplit_suffix {
        if options.split_long_records {
            return Err(SplitError::LegacyFormatWithSplitEnabled);
        }
        if version.is_some() {
            return Err(SplitError::LegacyFormatWithVersion);
        }
    }

    let mut sizes = StoredSizes::default();
    if payload.len() > CHUNK_SIZE {
        if !options.split_long_records {
            return Err(SplitError::RecordTooLong {
                prefix: key_bytes,
                length: payload.len(),
            });
        }
        save_split(tx, &key_bytes, &payload, options, &mut sizes)?;
    } else {
        save_unsplit(tx, &key_bytes, &payload, options, &mut sizes)?;
    }
    write_version(tx, &key_bytes, version, &mut sizes)?;
    Ok(sizes)
}

/// Writes an oversize payload as contiguous split chunks.
fn save_split(
    tx: &mut Transaction,
    key_bytes: &Bytes,
    payload: &Bytes,
    options: &SaveOptions,
    sizes: &mut StoredSizes,
) -> Result<()> {
    // The old layout may have more entries than this write, so the clear
    // is unconditional on the split path.
    clear_previous_record(
        tx,
        key_bytes,
        options.clear_based_on_previous,
        options.previous_sizes.as_ref(),
    )?;
    let chunk_count = payload.len().div_ceil(CHUNK_SIZE);
    tracing::debug!(
        prefix = ?key_bytes,
        payload_len = payload.len(),
        chunks = chunk_count,
        "splitting long record"
    );
    for (index, offset) in (0..payload.len()).step_by(CHUNK_SIZE).enumerate() {
        let end = (offset + CHUNK_SIZE).min(payload.len());
        let chunk = payload.slice(offset..end);
        let key = layout::data_key(key_bytes, START_SPLIT_SUFFIX + index as i64);
        if index == 0 {
            sizes.set_entry(&key, &chunk);
            sizes.split = true;
        } else {
            sizes.add_entry(&key, &chunk);
        }
        tx.set(key, chunk);
    }
    Ok(())
}

/// Writes a small payload as a single entry.
fn save_unsplit(
    tx: &mut Transaction,
    key_bytes: &Bytes,
    payload: &Bytes,
    options: &SaveOptions,
    sizes: &mut StoredSizes,
) -> Result<()> {
    // The previous-size counters are only trustworthy when the caller
    // opted in; otherwise treat the old record as unknown.
    let previous = if options.clear_based_on_previous {
        options.previous_sizes.as_ref()
    } else {
        None
    };
    if options.split_long_records || previous.is_none_or(|p| p.versioned_inline) {
        clear_previous_record(
            tx,
            key_bytes,
            options.clear_based_on_previous,
            options.previous_sizes.as_ref(),
        )?;
    }
    let key = if options.omit_unsplit_suffix {
        key_bytes.clone()
    } else {
        layout::data_key(key_bytes, UNSPLIT_SUFFIX)
    };
    sizes.set_entry(&key, payload);
    sizes.split = false;
    tx.set(key, payload.clone());
    Ok(())
}

/// Writes the version entry, if any.
fn write_version(
    tx: &mut Transaction,
    key_bytes: &Bytes,
    version: Option<Versionstamp>,
    sizes: &mut StoredSizes,
) -> Result<()> {
    let Some(version) = version else {
        sizes.versioned_inline = false;
        return Ok(());
    };
    let key = layout::version_key(key_bytes);
    let value = layout::pack_version(&version)?;
    sizes.versioned_inline = true;
    sizes.key_count += 1;
    sizes.key_size += key.len() as u64;
    // Durable bytes only: the offset tail of an incomplete version is
    // consumed by the store at commit.
    sizes.value_size += (1 + VERSION_LENGTH) as u64;
    if version.is_complete() {
        tx.set(key, value);
    } else {
        tx.set_versionstamped_value(key, value)?;
        tx.set_local_version(key_bytes.clone(), version.user_version());
    }
    Ok(())
}

/// Clears whatever the previous record under `key_bytes` occupied.
///
/// With trustworthy previous sizes the clear shrinks to the single
/// unsplit key; a split or versioned old record, or no information at
/// all, clears the whole prefix range. Cached incomplete-version state
/// for the record is unregistered in every case.
fn clear_previous_record(
    tx: &mut Transaction,
    key_bytes: &Bytes,
    clear_based_on_previous: bool,
    previous_sizes: Option<&StoredSizes>,
) -> Result<()> {
    match (clear_based_on_previous, previous_sizes) {
        (true, None) => {
            // Fresh write: nothing to clear.
        }
        (true, Some(previous)) if !previous.split && !previous.versioned_inline => {
            tx.clear(layout::data_key(key_bytes, UNSPLIT_SUFFIX));
        }
        _ => {
            let (begin, end) = prefix_range(key_bytes)?;
            tx.clear_range(begin, end);
        }
    }
    tx.remove_version_mutation(&layout::version_key(key_bytes));
    tx.clear_local_version(key_bytes);
    Ok(())
}

/// Deletes the record under `primary_key`, clearing all of its entries.
pub fn delete(
    tx: &mut Transaction,
    subspace: &Subspace,
    primary_key: &Tuple,
    options: &DeleteOptions,
) -> Result<()> {
    let key_bytes = subspace.pack(primary_key);
    if !options.split_long_records && options.missing_unsplit_record_suffix {
        // Legacy layout: the record is the bare key, nothing else exists.
        tx.clear(key_bytes);
        return Ok(());
    }
    clear_previous_record(
        tx,
        &key_bytes,
        options.clear_based_on_previous,
        options.previous_sizes.as_ref(),
    )
}
