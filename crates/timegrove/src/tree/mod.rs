//! The time-partition index: a sparse, depth-bounded folder tree mapping
//! timestamps to the leaf directories that hold physical data files.

mod calendar;
mod container;
mod node;

pub use calendar::{CalendarIndex, TimeIndex};
pub use container::{FileContainer, FileTriple};
pub use node::{FileCut, FileRef, FolderTree, NodeId};
