//! # Lamproite
//!
//! A record layer split codec over an ordered, transactional key-value
//! store. Logical records — opaque payloads with optional commit-ordered
//! versions — are stored as one or more contiguous entries sharing a key
//! prefix, and reassembled from range scans in either direction.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         Lamproite                             │
//! │  ┌───────────┐    ┌────────────┐    ┌───────────────────┐    │
//! │  │  tuple    │ →  │    kv      │ →  │      record       │    │
//! │  │ (codec)   │    │ (engine,   │    │ (split writer,    │    │
//! │  │           │    │  cursors)  │    │  readers)         │    │
//! │  └───────────┘    └────────────┘    └───────────────────┘    │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use lamproite::{
//!     Database, RecordFormat, SaveOptions, Subspace, Tuple, load, save,
//! };
//!
//! # fn main() -> Result<(), lamproite::SplitError> {
//! let db = Database::new();
//! let subspace = Subspace::new(&b"\x01"[..]);
//! let format = RecordFormat {
//!     split_long_records: true,
//!     ..RecordFormat::default()
//! };
//!
//! let mut tx = db.transact();
//! let pk = Tuple::new().with("order").with(42i64);
//! save(
//!     &mut tx,
//!     &subspace,
//!     &pk,
//!     &b"payload"[..],
//!     None,
//!     &SaveOptions {
//!         split_long_records: true,
//!         ..SaveOptions::default()
//!     },
//! )?;
//!
//! let record = load(&tx, &subspace, &pk, &format)?.expect("record exists");
//! assert_eq!(&record.payload()[..], b"payload");
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - **Tuple codec**: [`Tuple`], [`Subspace`], [`Versionstamp`]
//! - **Store**: [`Database`], [`Transaction`], [`RecordCursor`],
//!   [`ScanLimiter`]
//! - **Split codec**: [`save`], [`delete`], [`load`], [`exists`],
//!   [`SplitRecordCursor`], [`RawRecord`], [`StoredSizes`]

pub use lamproite_kv::{
    CommitStamp, Continuation, Database, KeyValue, KeyValueCursor, KvError, NoNextReason,
    RecordCursor, ScanLimiter, ScanProperties, Transaction,
};
pub use lamproite_record::{
    DeleteOptions, RawRecord, RecordFormat, SaveOptions, SplitError, SplitRecordCursor,
    StoredSizes, delete, exists, layout, load, save,
};
pub use lamproite_tuple::{Element, Subspace, Tuple, TupleError, Versionstamp};
