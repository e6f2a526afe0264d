//! Error types for Strata.
//!
//! The variants follow the four failure families of the engine:
//!
//! | Family | Variant | Retried? |
//! |--------|---------|----------|
//! | Capacity/shape | [`Error::Capacity`] | never, fails before output |
//! | I/O | [`Error::Io`] | caller's decision |
//! | Corruption | [`Error::Storage`] | never, fatal for the buffer |
//! | Lifetime | [`Error::Lifetime`] | contract violation |

use thiserror::Error;

/// Result alias used throughout Strata.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Temporary storage read or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoded data could not be decoded.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A size, width or index constraint was violated.
    #[error("capacity error: {0}")]
    Capacity(#[from] CapacityError),

    /// A reference-counted block was used outside its lifetime.
    #[error("lifetime error: {0}")]
    Lifetime(#[from] LifetimeError),

    /// Persisted metadata disagrees with the component reloading it.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// Object payload serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Internal invariant broken.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Decode-side failures. All of these are fatal for the affected buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Generic corruption with a description.
    #[error("corrupt data: {0}")]
    Corruption(String),

    /// The codec tag byte is not one we write.
    #[error("unknown codec tag {0:#04x}")]
    UnknownCodecTag(u8),

    /// A row index points past the end of its dictionary table.
    #[error("row index {index} out of table bounds (table length {len})")]
    IndexOutOfTable {
        /// Offending index.
        index: u32,
        /// Table length at decode time.
        len: usize,
    },

    /// A spilled chunk failed checksum verification.
    #[error("checksum mismatch in spilled chunk {chunk}")]
    ChecksumMismatch {
        /// Ordinal of the chunk within its buffer.
        chunk: usize,
    },

    /// The encoded run was written for a different value shape.
    #[error("expected {expected} encoding, found {found}")]
    UnexpectedShape {
        /// Shape the reader was built for.
        expected: &'static str,
        /// Shape recorded in the data.
        found: &'static str,
    },
}

/// Capacity and shape violations. Raised before any partial output exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapacityError {
    /// Inputs of a many-input operation disagree on their length.
    #[error("input {input} has {found} items, expected {expected}")]
    SizeMismatch {
        /// Index of the offending input.
        input: usize,
        /// Length of the first input.
        expected: usize,
        /// Length of the offending input.
        found: usize,
    },

    /// Block index past the last block.
    #[error("block {index} out of range ({count} blocks)")]
    BlockOutOfRange {
        /// Requested block.
        index: usize,
        /// Number of blocks in the buffer.
        count: usize,
    },

    /// A new label would need a slot beyond the declared output width.
    #[error("label {label:?} overflows vector width {width}")]
    LabelOverflow {
        /// Label that did not fit.
        label: String,
        /// Declared output width.
        width: usize,
    },

    /// A scatter index is outside the output vector.
    #[error("slot {slot} out of range for vector width {width}")]
    SlotOutOfRange {
        /// Requested slot.
        slot: usize,
        /// Declared output width.
        width: usize,
    },

    /// A dense value does not match the declared width.
    #[error("expected width {expected}, found {found}")]
    WidthMismatch {
        /// Declared width.
        expected: usize,
        /// Actual width.
        found: usize,
    },
}

/// Reference counting contract violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifetimeError {
    /// The block was already released back to its pool.
    #[error("block {id} was already released")]
    Released {
        /// Allocation id of the block.
        id: u64,
    },

    /// Release called on a block with no outstanding references.
    #[error("block {id} released more times than acquired")]
    Underflow {
        /// Allocation id of the block.
        id: u64,
    },
}

impl Error {
    /// Shorthand for a corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Storage(StorageError::Corruption(msg.into()))
    }

    /// Returns true if this error means the stored bytes cannot be trusted.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
