//! # lamproite-record: Record split codec for Lamproite
//!
//! Stores a logical record — an opaque payload plus an optional
//! versionstamp — as one or more contiguous entries in the ordered store,
//! and reassembles records from range scans in either direction.
//!
//! # Key layout
//!
//! Every entry of a record shares the prefix `subspace.pack(primary_key)`
//! and ends in one tuple-encoded integer suffix:
//!
//! ```text
//! ┌──────────────┬────────────────────────────────────────────────┐
//! │  Suffix      │  Meaning                                       │
//! ├──────────────┼────────────────────────────────────────────────┤
//! │  -1          │  versionstamp entry (sorts before all data)    │
//! │   0          │  unsplit payload (≤ 100 000 bytes)             │
//! │   1, 2, …    │  split payload chunks, contiguous from 1       │
//! │  (none)      │  legacy unsplit layout, bare prefix as key     │
//! └──────────────┴────────────────────────────────────────────────┘
//! ```
//!
//! Payloads above [`CHUNK_SIZE`](layout::CHUNK_SIZE) bytes are chunked
//! across split entries; smaller payloads occupy a single unsplit entry.
//! Because `-1 < 0 < 1 < …` holds at the byte level, a forward scan sees
//! a record's version entry first and a reverse scan sees it last.
//!
//! # Components
//!
//! - [`layout`] — suffix constants and the per-entry key/value codec
//! - [`save`]/[`delete`] — writing records, with minimal-overwrite clears
//!   driven by the previous write's [`StoredSizes`]
//! - [`load`]/[`exists`] — single-record reads
//! - [`SplitRecordCursor`] — streaming reassembly of many records from a
//!   range scan, honoring a scan budget at record boundaries only
//!
//! # Versions
//!
//! A record version written inside an open transaction may be incomplete:
//! the store fills in its ten transaction bytes at commit. Readers in the
//! same transaction synthesize the version from the transaction-local
//! cache, so a just-written record reads back with its version even
//! though nothing durable exists yet.

use bytes::Bytes;
use thiserror::Error;

use lamproite_kv::KvError;
use lamproite_tuple::TupleError;

mod accumulator;
pub mod layout;
mod record;
mod single;
mod sizes;
mod stream;
mod writer;

pub use record::RawRecord;
pub use single::{RecordFormat, exists, load};
pub use sizes::StoredSizes;
pub use stream::SplitRecordCursor;
pub use writer::{DeleteOptions, SaveOptions, delete, save};


/// The error type for record split operations.
#[derive(Debug, Error)]
pub enum SplitError {
    /// The legacy no-suffix layout cannot carry a record version.
    #[error("legacy unsplit format cannot carry a record version")]
    LegacyFormatWithVersion,

    /// The legacy no-suffix layout cannot be combined with long-record
    /// splitting.
    #[error("omitting the unsplit suffix requires long-record splitting to be disabled")]
    LegacyFormatWithSplitEnabled,

    /// The payload exceeds the chunk threshold and splitting is disabled.
    #[error("record too long: {length} bytes for prefix {prefix:?}")]
    RecordTooLong { prefix: Bytes, length: usize },

    /// Split chunks were observed out of order or with a gap.
    #[error(
        "split segments out of order under prefix {prefix:?}: \
         expected index {expected}, found {found} (reverse: {reverse})"
    )]
    SplitSegmentsOutOfOrder {
        prefix: Bytes,
        expected: i64,
        found: i64,
        reverse: bool,
    },

    /// A split chunk (or a bare version) appeared without a reachable
    /// start of record in scan direction.
    #[error(
        "found split record without start under prefix {prefix:?}: \
         index {index} (reverse: {reverse})"
    )]
    FoundSplitWithoutStart {
        prefix: Bytes,
        index: i64,
        reverse: bool,
    },

    /// More than one unsplit entry exists for one record.
    #[error("more than one unsplit value under prefix {prefix:?} (reverse: {reverse})")]
    MoreThanOneUnsplitValue { prefix: Bytes, reverse: bool },

    /// Unsplit and split entries are mixed under one record.
    #[error(
        "unsplit value followed by split chunk {index} under prefix {prefix:?} \
         (reverse: {reverse})"
    )]
    UnsplitFollowedBySplit {
        prefix: Bytes,
        index: i64,
        reverse: bool,
    },

    /// A version entry was observed by a reader configured for the
    /// versionless legacy format.
    #[error("version entry observed under prefix {prefix:?} in old version format")]
    OldVersionFormatViolation { prefix: Bytes },

    /// An entry key did not end in exactly one tuple-encoded integer
    /// suffix.
    #[error("key {key:?} does not carry a single integer suffix under prefix {prefix:?}")]
    SubkeyShape { key: Bytes, prefix: Bytes },

    /// Tuple encoding or decoding failed.
    #[error(transparent)]
    Tuple(#[from] TupleError),

    /// The underlying store failed.
    #[error(transparent)]
    Kv(#[from] KvError),
}

/// A specialized `Result` type for record split operations.
pub type Result<T> = std::result::Result<T, SplitError>;
