//! Error and Result types for store operations.

use std::io;
use thiserror::Error;

/// A convenience `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A caller-supplied argument violated a precondition. No state changed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A file descriptor would overlap an existing sibling.
    ///
    /// Always fatal to the operation that caused it; signals a concurrency
    /// collision or an internal logic defect.
    #[error("File range [{new_first}, {new_last}] overlaps existing file [{existing_first}, {existing_last}]")]
    Overlap {
        /// First timestamp of the rejected descriptor.
        new_first: i64,
        /// Last timestamp of the rejected descriptor.
        new_last: i64,
        /// First timestamp of the conflicting registered file.
        existing_first: i64,
        /// Last timestamp of the conflicting registered file.
        existing_last: i64,
    },

    /// The in-memory index and disk state disagree.
    ///
    /// The affected accessor or reader must not be used further; continuing
    /// risks silent data loss or duplication. Never retried.
    #[error("Consistency violation: {0}")]
    Consistency(String),

    /// Decoded item count disagrees with the file header.
    #[error("Data integrity violation: header declares {expected} items, decoded {actual}")]
    DataIntegrity {
        /// Item count declared in the file header.
        expected: i32,
        /// Item count actually decoded.
        actual: i32,
    },

    /// The file was written by a newer format than this build supports.
    #[error("Incompatible format version {0}")]
    IncompatibleVersion(i32),

    /// An operation was invoked in a state that does not permit it.
    #[error("Operation order violation: {0}")]
    OperationOrder(String),

    /// Error raised by a compression or encryption codec.
    #[error("Codec '{code}' failed: {message}")]
    Codec {
        /// Key code of the failing codec.
        code: String,
        /// What went wrong.
        message: String,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Non-fatal notification raised while restoring an exact reading position.
///
/// Delivered through the callback passed into `seek`; reading continues from
/// the best available approximation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreWarning {
    /// No item was found at the recorded time and ordinal.
    ItemNotFound {
        /// Stream the position belongs to.
        stream_key: String,
        /// Recorded timestamp ticks.
        time: i64,
        /// Recorded ordinal among items sharing `time`.
        count_at_time: u32,
    },
    /// An item was found but its business hash did not match the recorded one.
    HashMismatch {
        /// Stream the position belongs to.
        stream_key: String,
        /// Recorded timestamp ticks.
        time: i64,
        /// Hash stored in the position.
        expected: u64,
        /// Hash of the item actually found.
        actual: u64,
    },
}
