//! # lamproite-kv: Ordered transactional key-value engine for Lamproite
//!
//! This crate provides the storage substrate the record layer writes to
//! and scans from:
//!
//! - [`Database`] — an ordered, in-memory key-value store with
//!   monotonically increasing commit versions
//! - [`Transaction`] — snapshot isolation with read-your-writes, ordered
//!   mutation replay at commit, and versionstamped-value resolution
//! - [`KeyValueCursor`] — a resumable range scan over a transaction's
//!   view, forward or reverse, with opaque [`Continuation`]s
//! - [`RecordCursor`] — the capability interface every cursor implements
//!   (`on_next` / `continuation` / `no_next_reason` / `close`)
//! - [`ScanLimiter`] — the scan-budget signal consumed by streaming
//!   readers
//!
//! # Versionstamped values
//!
//! A versionstamped-value mutation carries a value whose last four bytes
//! are a little-endian offset pointing at ten placeholder bytes inside the
//! value. The mutation is invisible to reads within its own transaction;
//! at commit the placeholder is overwritten with the 10-byte commit stamp
//! and the offset tail is stripped. Transactions additionally keep a local
//! version cache so readers can surface a not-yet-durable version.

use thiserror::Error;

mod cursor;
mod database;
mod limiter;
mod transaction;

pub use cursor::{
    Continuation, KeyValue, KeyValueCursor, NoNextReason, RecordCursor, ScanProperties,
};
pub use database::{CommitStamp, Database};
pub use limiter::ScanLimiter;
pub use transaction::Transaction;

/// The error type for key-value store operations.
#[derive(Debug, Error)]
pub enum KvError {
    /// A cursor continuation was requested outside the permitted window
    /// (immediately after `on_next` returned an item or a terminal
    /// no-next).
    #[error("continuation accessed before the cursor produced a result")]
    IllegalContinuationAccess,

    /// A continuation byte string could not be decoded.
    #[error("invalid continuation: {reason}")]
    InvalidContinuation { reason: String },

    /// A versionstamped value did not carry a well-formed offset tail.
    #[error(
        "malformed versionstamped value: {len} bytes with placeholder offset {offset} \
         (offset plus stamp must fit before the 4-byte tail)"
    )]
    MalformedVersionstampedValue { len: usize, offset: u32 },
}

/// A specialized `Result` type for key-value store operations.
pub type Result<T> = std::result::Result<T, KvError>;
