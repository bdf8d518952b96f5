//! # lamproite-tuple: Order-preserving tuple encoding for Lamproite
//!
//! This crate contains the key/value byte encoding shared by the record
//! layer:
//! - Typed tuple elements ([`Element`]) and tuples ([`Tuple`]) with a byte
//!   encoding that preserves element-wise ordering
//! - Commit-time version tokens ([`Versionstamp`])
//! - Key namespacing ([`Subspace`]) and prefix ranges ([`prefix_range`])
//!
//! # Encoding
//!
//! Each element is a type code byte followed by a type-specific body:
//!
//! ```text
//! ┌──────────────┬──────┬──────────────────────────────────────────┐
//! │  Element     │ Code │  Body                                    │
//! ├──────────────┼──────┼──────────────────────────────────────────┤
//! │  Bytes       │ 0x01 │  NUL-escaped bytes, 0x00 terminator      │
//! │  String      │ 0x02 │  NUL-escaped UTF-8, 0x00 terminator      │
//! │  Int(n < 0)  │ 0x14-k │ k-byte offset complement, big-endian   │
//! │  Int(0)      │ 0x14 │  empty                                   │
//! │  Int(n > 0)  │ 0x14+k │ k-byte magnitude, big-endian           │
//! │  Versionstamp│ 0x33 │  12 raw bytes                            │
//! └──────────────┴──────┴──────────────────────────────────────────┘
//! ```
//!
//! The encoding is designed so that `pack(a) < pack(b)` under unsigned
//! byte comparison exactly when `a < b` element-wise. In particular
//! `Int(-1) < Int(0) < Int(1) < Int(2) …` holds at the byte level, which
//! the record layer relies on for its key suffix layout.

use bytes::Bytes;
use thiserror::Error;

mod subspace;
mod tuple;
mod versionstamp;

pub use subspace::{Subspace, prefix_range, strinc};
pub use tuple::{Element, Tuple};
pub use versionstamp::{TR_VERSION_LEN, USER_VERSION_LEN, VERSIONSTAMP_LEN, Versionstamp};

/// The error type for tuple encoding and decoding operations.
#[derive(Debug, Error)]
pub enum TupleError {
    #[error("unknown element type code {code:#04x} at offset {offset}")]
    UnknownTypeCode { code: u8, offset: usize },

    #[error("truncated element at offset {offset}")]
    Truncated { offset: usize },

    #[error("integer element does not fit in 64 bits")]
    IntOutOfRange,

    #[error("invalid UTF-8 in string element")]
    InvalidUtf8,

    #[error("expected {expected} element, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("packing with versionstamp requires exactly one incomplete versionstamp, found {found}")]
    IncompleteVersionstampCount { found: usize },

    #[error("versionstamp must be 12 bytes, found {found}")]
    VersionstampLength { found: usize },

    #[error("key is not contained in the subspace")]
    NotInSubspace { key: Bytes },

    #[error("prefix consists entirely of 0xFF bytes and has no upper bound")]
    UnboundedPrefix,
}

/// A specialized `Result` type for tuple operations.
pub type Result<T> = std::result::Result<T, TupleError>;
