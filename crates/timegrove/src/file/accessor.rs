//! Single-writer buffered access to one physical data file.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{Coder, CoderRegistry};
use crate::error::{Result, StoreError};
use crate::file::{FileDescriptor, FORMAT_VERSION};
use crate::item::{DataItem, TieBreak, TimeRange, Timestamp};
use crate::tree::FileContainer;
use crate::txn::CommitScope;

/// Observable lifecycle state of a [`FileAccessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorState {
    /// No physical file exists yet; the buffer may hold unwritten items.
    Unattached,
    /// A physical file backs the buffer; `dirty` distinguishes pending edits.
    Buffered {
        /// True when the buffer has diverged from disk.
        dirty: bool,
    },
    /// The accessor was closed and accepts no further operations.
    Closed,
}

/// Owns the in-memory item list of one physical file.
///
/// The accessor enforces its accept range — the `[min, max)` window derived
/// from neighboring files — so that no sequence of adds can ever produce a
/// file overlapping a sibling.
pub struct FileAccessor {
    /// Directory of the owning leaf.
    dir: PathBuf,
    /// Descriptor of the physical file, `None` before the first flush.
    descriptor: Option<FileDescriptor>,
    items: Vec<DataItem>,
    accept: TimeRange,
    compressor: Arc<dyn Coder>,
    encryptor: Option<Arc<dyn Coder>>,
    dirty: bool,
    sorted: bool,
    closed: bool,
    /// Cached (min, max) timestamps of the buffer; `None` means recompute.
    bounds: Option<(Timestamp, Timestamp)>,
}

impl FileAccessor {
    /// Creates an accessor for a file that does not exist yet.
    pub fn create(
        dir: impl Into<PathBuf>,
        accept: TimeRange,
        compressor: Arc<dyn Coder>,
        encryptor: Option<Arc<dyn Coder>>,
    ) -> Self {
        Self {
            dir: dir.into(),
            descriptor: None,
            items: Vec::new(),
            accept,
            compressor,
            encryptor,
            dirty: false,
            sorted: true,
            closed: false,
            bounds: None,
        }
    }

    /// Creates an accessor over an existing file, resolving its codecs from
    /// the descriptor. The buffer stays empty until [`load`](Self::load).
    pub fn open(
        dir: impl Into<PathBuf>,
        descriptor: FileDescriptor,
        accept: TimeRange,
        registry: &CoderRegistry,
    ) -> Result<Self> {
        let compressor = registry.require(descriptor.compressor_code())?;
        let encryptor = match descriptor.encryptor_code() {
            Some(code) => Some(registry.require(code)?),
            None => None,
        };
        Ok(Self {
            dir: dir.into(),
            descriptor: Some(descriptor),
            items: Vec::new(),
            accept,
            compressor,
            encryptor,
            dirty: false,
            sorted: true,
            closed: false,
            bounds: None,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AccessorState {
        if self.closed {
            AccessorState::Closed
        } else if self.descriptor.is_none() && !self.dirty {
            AccessorState::Unattached
        } else {
            AccessorState::Buffered { dirty: self.dirty }
        }
    }

    /// The descriptor of the backing file, if one exists.
    pub fn descriptor(&self) -> Option<&FileDescriptor> {
        self.descriptor.as_ref()
    }

    /// The accept window.
    pub fn accept_range(&self) -> TimeRange {
        self.accept
    }

    /// Replaces the accept window.
    pub fn set_accept_range(&mut self, accept: TimeRange) {
        self.accept = accept;
    }

    /// The buffered items, in buffer order (sorted only after
    /// [`sort_items`](Self::sort_items) or a load of a sorted file).
    pub fn items(&self) -> &[DataItem] {
        &self.items
    }

    /// Number of buffered items.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// True when the buffer holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when the buffer has changes not yet flushed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The items that have not been persisted: the whole working set while
    /// the buffer is dirty, nothing otherwise.
    pub fn unsaved_items(&self) -> &[DataItem] {
        if self.dirty {
            &self.items
        } else {
            &[]
        }
    }

    /// Smallest buffered timestamp.
    pub fn first_timestamp(&mut self) -> Option<Timestamp> {
        self.ensure_bounds().map(|(first, _)| first)
    }

    /// Largest buffered timestamp.
    pub fn last_timestamp(&mut self) -> Option<Timestamp> {
        self.ensure_bounds().map(|(_, last)| last)
    }

    /// True if `ts` lies within the buffer's current min/max span.
    pub fn spans(&mut self, ts: Timestamp) -> bool {
        match self.ensure_bounds() {
            Some((first, last)) => ts >= first && ts <= last,
            None => false,
        }
    }

    fn ensure_bounds(&mut self) -> Option<(Timestamp, Timestamp)> {
        if self.bounds.is_none() && !self.items.is_empty() {
            let mut first = Timestamp::MAX;
            let mut last = Timestamp::MIN;
            for item in &self.items {
                first = first.min(item.timestamp());
                last = last.max(item.timestamp());
            }
            self.bounds = Some((first, last));
        }
        self.bounds
    }

    /// Buffers an item.
    ///
    /// Returns `false` without any state change when the timestamp falls
    /// outside the accept window. An accepted item marks the buffer dirty;
    /// the sorted flag is cleared if it arrives out of order.
    pub fn add(&mut self, item: DataItem) -> bool {
        debug_assert!(!self.closed, "add on closed accessor");
        if !self.accept.contains(item.timestamp()) {
            return false;
        }
        if let Some(last) = self.items.last() {
            if item.timestamp() < last.timestamp() {
                self.sorted = false;
            }
        }
        match &mut self.bounds {
            Some((first, last)) => {
                *first = (*first).min(item.timestamp());
                *last = (*last).max(item.timestamp());
            }
            None => self.bounds = Some((item.timestamp(), item.timestamp())),
        }
        self.items.push(item);
        self.dirty = true;
        true
    }

    /// Removes buffered items not matching the predicate, marking the buffer
    /// dirty when anything was dropped.
    pub fn retain<F: FnMut(&DataItem) -> bool>(&mut self, f: F) {
        let before = self.items.len();
        self.items.retain(f);
        if self.items.len() != before {
            self.dirty = true;
            self.bounds = None;
        }
    }

    /// Stable-sorts the buffer by timestamp, then the tie-break comparator.
    ///
    /// A no-op when the buffer is already sorted, unless `force` is set.
    pub fn sort_items(&mut self, tie_break: Option<&TieBreak>, force: bool) {
        if self.sorted && !force {
            return;
        }
        self.items
            .sort_by(|a, b| crate::item::compare_items(a, b, tie_break));
        self.sorted = true;
    }

    /// Reads the physical file into the buffer.
    ///
    /// Verifies the format version and the declared item count; caches the
    /// first/last timestamps without requiring a sort.
    pub fn load(&mut self) -> Result<()> {
        if self.closed {
            return Err(StoreError::OperationOrder("load on closed accessor".into()));
        }
        let descriptor = self.descriptor.clone().ok_or_else(|| {
            StoreError::OperationOrder("load on accessor without a backing file".into())
        })?;
        let path = self.dir.join(descriptor.file_name());
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::Consistency(format!("data file missing on disk: {}", path.display()))
            } else {
                StoreError::Io(e)
            }
        })?;
        let mut reader = BufReader::new(file);

        let mut buf4 = [0u8; 4];
        reader.read_exact(&mut buf4)?;
        let version = i32::from_le_bytes(buf4);
        if version > FORMAT_VERSION {
            return Err(StoreError::IncompatibleVersion(version));
        }

        reader.read_exact(&mut buf4)?;
        let declared = i32::from_le_bytes(buf4);
        if declared < 0 {
            return Err(StoreError::DataIntegrity {
                expected: declared,
                actual: 0,
            });
        }

        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;
        let body = self.compressor.wrap_decoding(&body)?;
        let body = match &self.encryptor {
            Some(enc) => enc.wrap_decoding(&body)?,
            None => body,
        };

        let mut cursor = body.as_slice();
        let mut items: Vec<DataItem> = Vec::with_capacity(declared as usize);
        let mut sorted = true;
        let mut first = Timestamp::MAX;
        let mut last = Timestamp::MIN;
        while !cursor.is_empty() {
            let item = match DataItem::decode_from(&mut cursor) {
                Ok(item) => item,
                Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(StoreError::DataIntegrity {
                        expected: declared,
                        actual: items.len() as i32,
                    });
                }
                Err(e) => return Err(e),
            };
            if let Some(prev) = items.last() {
                if item.timestamp() < prev.timestamp() {
                    sorted = false;
                }
            }
            first = first.min(item.timestamp());
            last = last.max(item.timestamp());
            items.push(item);
        }

        if items.len() as i32 != declared {
            return Err(StoreError::DataIntegrity {
                expected: declared,
                actual: items.len() as i32,
            });
        }

        debug!(
            file = %path.display(),
            items = items.len(),
            "loaded data file"
        );

        self.bounds = if items.is_empty() {
            None
        } else {
            Some((first, last))
        };
        self.items = items;
        self.sorted = sorted;
        self.dirty = false;
        Ok(())
    }

    /// Flushes the buffer to disk and synchronizes the container index.
    ///
    /// An empty buffer deletes the physical file (if one existed) and
    /// notifies the container of the deletion. Otherwise the items are
    /// sorted if needed and written to a new physical file; the old file is
    /// deleted afterwards, and the container is notified last so its index
    /// only reflects consistent disk state.
    pub fn flush(
        &mut self,
        tie_break: Option<&TieBreak>,
        container: &mut FileContainer,
    ) -> Result<()> {
        if self.closed {
            return Err(StoreError::OperationOrder("flush on closed accessor".into()));
        }
        if !self.dirty {
            return Ok(());
        }

        if self.items.is_empty() {
            if let Some(old) = self.descriptor.take() {
                let old_path = self.dir.join(old.file_name());
                fs::remove_file(&old_path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        StoreError::Consistency(format!(
                            "data file missing on delete: {}",
                            old_path.display()
                        ))
                    } else {
                        StoreError::Io(e)
                    }
                })?;
                container.file_deleted(&old)?;
                debug!(file = %old_path.display(), "deleted emptied data file");
            }
            self.dirty = false;
            return Ok(());
        }

        self.sort_items(tie_break, false);
        let first = self.items[0].timestamp();
        let last = self.items[self.items.len() - 1].timestamp();
        let new_desc = FileDescriptor::new(
            first,
            last,
            self.compressor.key_code(),
            self.encryptor.as_ref().map(|c| c.key_code().to_string()),
        );

        let mut body = Vec::new();
        for item in &self.items {
            item.encode_to(&mut body)?;
        }
        let body = match &self.encryptor {
            Some(enc) => enc.wrap_encoding(&body)?,
            None => body,
        };
        let body = self.compressor.wrap_encoding(&body)?;

        let new_path = self.dir.join(new_desc.file_name());
        let scope = CommitScope::begin(&new_path);
        {
            let file = File::create(scope.tmp_path())?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
            writer.write_all(&(self.items.len() as i32).to_le_bytes())?;
            writer.write_all(&body)?;
            writer.flush()?;
        }
        scope.complete()?;

        let old = self.descriptor.take();
        if let Some(old_desc) = &old {
            let old_path = self.dir.join(old_desc.file_name());
            if old_path != new_path {
                if let Err(e) = fs::remove_file(&old_path) {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        warn!(file = %old_path.display(), "old data file already gone");
                    } else {
                        return Err(e.into());
                    }
                }
            }
        }

        match old {
            Some(old_desc) => container.file_changed(&old_desc, new_desc.clone())?,
            None => container.file_added(new_desc.clone())?,
        }

        debug!(
            file = %new_path.display(),
            items = self.items.len(),
            "flushed data file"
        );
        self.descriptor = Some(new_desc);
        self.dirty = false;
        Ok(())
    }

    /// Closes the accessor; any buffered changes are discarded.
    pub fn close(&mut self) {
        if self.dirty {
            warn!(
                dir = %self.dir.display(),
                unsaved = self.items.len(),
                "accessor closed with unflushed items"
            );
        }
        self.closed = true;
    }

    /// Directory of the owning leaf.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
