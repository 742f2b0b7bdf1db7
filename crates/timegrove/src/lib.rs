//! Timegrove - embedded, append-mostly time-series store.
//!
//! Timestamped records are persisted into files grouped by a calendar-like,
//! depth-bounded directory tree that acts as a time index. Clients write
//! items into named logical streams ("folders") and read them back, forward
//! or backward in time, across one or many streams merged into a single
//! chronological sequence, with the ability to suspend and precisely resume
//! reading later.
//!
//! # Components
//!
//! - [`TimeStore`]: folder management and reader/writer construction
//! - [`StreamWriter`]: sequential append with soft file-size targets and
//!   safe out-of-order inserts
//! - [`MergeReader`]: k-way chronological merge with lazy file loading and
//!   resumable positions
//! - [`FolderTree`] / [`CalendarIndex`]: the sparse time-partition index
//!
//! # Example
//!
//! ```rust,ignore
//! use timegrove::{DataItem, TimeStore};
//!
//! let store = TimeStore::open("/data/grove")?;
//!
//! let mut writer = store.writer("sensors/temp")?;
//! writer.write(DataItem::new("sensors/temp", now_ticks, payload))?;
//! writer.flush()?;
//!
//! let mut reader = store.reader(&["sensors/temp", "sensors/humidity"])?;
//! reader.seek(0)?;
//! while let Some(item) = reader.read()? {
//!     // items arrive in global timestamp order
//! }
//! let position = reader.position(); // serializable; restore it later
//! ```

#![deny(missing_docs)]

pub mod codec;
pub mod error;
pub mod file;
pub mod item;
pub mod registry;
pub mod settings;
pub mod store;
pub mod stream;
pub mod tree;
pub mod txn;

pub use codec::{Coder, CoderRegistry, GzipCoder, NopCoder};
pub use error::{RestoreWarning, Result, StoreError};
pub use file::{FileAccessor, FileDescriptor};
pub use item::{DataItem, TieBreak, TimeRange, Timestamp};
pub use settings::FolderSettings;
pub use store::{StoreOptions, TimeStore};
pub use stream::{
    Direction, FolderReadingPosition, MergeReader, ReadingPosition, StreamReader, StreamWriter,
};
pub use tree::{CalendarIndex, FileContainer, FolderTree, TimeIndex};
