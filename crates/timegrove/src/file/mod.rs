//! Physical data files: naming, binary format, and buffered access.
//!
//! ## File structure
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Header (8 bytes)                            │
//! │  - Format version: i32 LE                    │
//! │  - Item count: i32 LE                        │
//! ├──────────────────────────────────────────────┤
//! │  Body: serialized item list, wrapped by the  │
//! │  encryption coder (optional) then the        │
//! │  compression coder                           │
//! └──────────────────────────────────────────────┘
//! ```

mod accessor;
mod descriptor;

pub use accessor::{AccessorState, FileAccessor};
pub use descriptor::FileDescriptor;

/// Current data file format version.
pub const FORMAT_VERSION: i32 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 8;
