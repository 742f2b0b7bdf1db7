//! Logical streams: the sequential writer, the per-stream reader, and the
//! multi-stream chronological merge.

mod merge;
mod position;
mod reader;
mod writer;

pub use merge::MergeReader;
pub use position::{Direction, FolderReadingPosition, ReadingPosition};
pub use reader::StreamReader;
pub use writer::StreamWriter;
