//! Sequential file iterator plus in-file cursor for one logical stream.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::codec::CoderRegistry;
use crate::error::{Result, RestoreWarning, StoreError};
use crate::file::FileAccessor;
use crate::item::{DataItem, TieBreak, Timestamp};
use crate::stream::{Direction, FolderReadingPosition};
use crate::tree::{FileRef, FolderTree, TimeIndex};

enum ReaderState {
    /// A next file has been located but not loaded.
    Offline { pending: FileRef },
    /// A file is loaded and the cursor rests on a current item.
    Online {
        file: FileRef,
        items: Vec<DataItem>,
        /// Index of the current (unconsumed) item; moves by ±1 per read.
        idx: isize,
    },
    /// No more data in the current direction.
    Exhausted,
}

/// Reads one logical stream in timestamp order, one file at a time.
///
/// A fresh reader is exhausted until the first [`seek`](Self::seek). File
/// loading is deferred: after a seek the reader only remembers which file
/// would come next ("offline"); the merge reader materializes it when the
/// stream is actually about to yield data.
pub struct StreamReader {
    stream_key: String,
    tree: FolderTree,
    registry: Arc<CoderRegistry>,
    tie_break: Option<TieBreak>,
    direction: Direction,
    state: ReaderState,
    /// Resume point: the seek time, then the timestamp of each read item.
    anchor: Timestamp,
    position: FolderReadingPosition,
    /// Exact position to verify when the located file loads.
    restore: Option<FolderReadingPosition>,
    /// Position strictly past the anchor instead of at-or-after it; set
    /// when a reversal re-seeks over an already-consumed timestamp.
    anchor_exclusive: bool,
    /// True while a seek result sits unloaded; blocks direction reversal.
    virgin: bool,
}

impl StreamReader {
    /// Creates a reader over the stream rooted at `root_dir`.
    pub fn new(
        stream_key: impl Into<String>,
        root_dir: impl Into<PathBuf>,
        index: Arc<dyn TimeIndex>,
        registry: Arc<CoderRegistry>,
        tie_break: Option<TieBreak>,
    ) -> Self {
        let stream_key = stream_key.into();
        let position = FolderReadingPosition::at_time(&stream_key, 0);
        Self {
            stream_key,
            tree: FolderTree::new(root_dir, index),
            registry,
            tie_break,
            direction: Direction::Forward,
            state: ReaderState::Exhausted,
            anchor: 0,
            position,
            restore: None,
            anchor_exclusive: false,
            virgin: false,
        }
    }

    /// The stream key this reader serves.
    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    /// Current reading direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// True when a file is loaded and a current item exists.
    pub fn is_online(&self) -> bool {
        matches!(self.state, ReaderState::Online { .. })
    }

    /// True when a next file is located but not loaded.
    pub fn is_offline(&self) -> bool {
        matches!(self.state, ReaderState::Offline { .. })
    }

    /// True when no more data exists in the current direction.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, ReaderState::Exhausted)
    }

    /// True when the stream may still yield items.
    pub fn has_data(&self) -> bool {
        !self.is_exhausted()
    }

    /// False while a seek result sits unloaded; reversing direction is only
    /// legal once every such stream has loaded at least once.
    pub fn is_sequential(&self) -> bool {
        !(self.virgin && self.is_offline())
    }

    /// This stream's resumable position.
    pub fn position(&self) -> FolderReadingPosition {
        self.position.clone()
    }

    /// Re-reads the partition tree from disk on next access.
    pub fn refresh(&mut self) {
        self.tree.refresh();
        self.state = ReaderState::Exhausted;
        self.virgin = false;
    }

    /// Positions the reader at `time`: the first item at-or-after it in the
    /// current direction. The covering or adjacent file is located but not
    /// loaded.
    pub fn seek(&mut self, time: Timestamp) -> Result<()> {
        self.anchor = time;
        self.position = FolderReadingPosition::at_time(&self.stream_key, time);
        self.restore = None;
        self.anchor_exclusive = false;

        let located = match self.tree.file_at(time)? {
            Some(owner) => Some(owner),
            None => self
                .tree
                .neighbor_file(time, self.direction == Direction::Backward)?,
        };
        self.state = match located {
            Some(pending) => {
                self.virgin = true;
                ReaderState::Offline { pending }
            }
            None => {
                self.virgin = false;
                ReaderState::Exhausted
            }
        };
        Ok(())
    }

    /// Sets the direction and seeks in one step. Direction assignment is
    /// unconditional here: the fresh seek discards any cursor state that
    /// would make a reversal ambiguous.
    pub fn seek_from(&mut self, time: Timestamp, direction: Direction) -> Result<()> {
        self.direction = direction;
        self.seek(time)
    }

    /// Sets the direction and seeks to an exact position in one step.
    pub fn seek_exact_from(
        &mut self,
        position: &FolderReadingPosition,
        direction: Direction,
    ) -> Result<()> {
        self.direction = direction;
        self.seek_exact(position)
    }

    /// Positions the reader at an exact per-stream position. Verification
    /// happens when the located file loads.
    pub fn seek_exact(&mut self, position: &FolderReadingPosition) -> Result<()> {
        self.seek(position.time)?;
        if position.is_exact() {
            self.restore = Some(position.clone());
        }
        Ok(())
    }

    /// Changes direction, re-deriving the cursor.
    ///
    /// Online streams keep their loaded file and step the cursor so the next
    /// read continues on the other side of the last consumed item; offline
    /// and exhausted streams re-seek from the last known time.
    pub fn reverse(&mut self) -> Result<()> {
        if !self.is_sequential() {
            return Err(StoreError::OperationOrder(format!(
                "stream '{}' has an unloaded seek result; load or read before reversing",
                self.stream_key
            )));
        }
        let old_step = self.step();
        let exact = self.position.is_exact();
        self.direction = self.direction.reversed();

        if self.is_online() && exact {
            // Last consumed sits one old-step behind the cursor; the next
            // item in the new direction is one further back.
            let chain_from = match &mut self.state {
                ReaderState::Online { file, items, idx } => {
                    *idx -= 2 * old_step;
                    let out = *idx < 0 || *idx >= items.len() as isize;
                    out.then(|| file.clone())
                }
                _ => None,
            };
            if let Some(file) = chain_from {
                self.chain_to_next_file(&file)?;
            }
            return Ok(());
        }

        // Nothing loaded, or nothing consumed since the seek: re-derive
        // from the last known time in the new direction.
        let time = if exact { self.position.time } else { self.anchor };
        self.seek(time)?;
        // Items at the recorded time were already consumed in the old
        // direction; resume strictly past them.
        self.anchor_exclusive = exact;
        Ok(())
    }

    fn step(&self) -> isize {
        match self.direction {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }

    /// The earliest timestamp (in reading order) the located-but-unloaded
    /// file could yield. Only meaningful while offline.
    pub fn potential_timestamp(&self) -> Option<Timestamp> {
        match &self.state {
            ReaderState::Offline { pending } => Some(match self.direction {
                Direction::Forward => pending.descriptor.first_timestamp().max(self.anchor),
                Direction::Backward => pending.descriptor.last_timestamp().min(self.anchor),
            }),
            _ => None,
        }
    }

    /// The current item, if online.
    pub fn current(&self) -> Option<&DataItem> {
        match &self.state {
            ReaderState::Online { items, idx, .. } => items.get(*idx as usize),
            _ => None,
        }
    }

    /// Consumes the current item: updates the position, advances the cursor,
    /// and locates (without loading) the next file when this one is done.
    pub fn consume(&mut self) -> Result<DataItem> {
        let step = self.step();
        let (item, done_file) = match &mut self.state {
            ReaderState::Online { file, items, idx } => {
                let item = items
                    .get(*idx as usize)
                    .cloned()
                    .ok_or_else(|| StoreError::Consistency("online cursor out of range".into()))?;
                *idx += step;
                let done = *idx < 0 || *idx >= items.len() as isize;
                (item, done.then(|| file.clone()))
            }
            _ => {
                return Err(StoreError::OperationOrder(
                    "consume on a stream with no current item".into(),
                ))
            }
        };

        self.position.note_read(&item);
        self.anchor = item.timestamp();
        self.anchor_exclusive = false;
        if let Some(file) = done_file {
            self.chain_to_next_file(&file)?;
        }
        Ok(item)
    }

    fn chain_to_next_file(&mut self, file: &FileRef) -> Result<()> {
        let (boundary, backwards) = match self.direction {
            Direction::Forward => (file.descriptor.last_timestamp(), false),
            Direction::Backward => (file.descriptor.first_timestamp(), true),
        };
        self.state = match self.tree.neighbor_file(boundary, backwards)? {
            Some(pending) => ReaderState::Offline { pending },
            None => ReaderState::Exhausted,
        };
        Ok(())
    }

    /// Loads the located file and positions the cursor, chaining through
    /// further files until a current item is found or the stream exhausts.
    ///
    /// Restore verification warnings are delivered through `notify`. Returns
    /// true when the stream is online afterwards.
    pub fn load_pending(
        &mut self,
        notify: &mut dyn FnMut(RestoreWarning),
    ) -> Result<bool> {
        loop {
            let pending = match &self.state {
                ReaderState::Offline { pending } => pending.clone(),
                ReaderState::Online { .. } => return Ok(true),
                ReaderState::Exhausted => return Ok(false),
            };

            let dir = self.tree.abs_dir(pending.leaf);
            let leaf_range = self.tree.range(pending.leaf);
            let mut accessor = FileAccessor::open(
                &dir,
                pending.descriptor.clone(),
                leaf_range,
                &self.registry,
            )?;
            accessor.load()?;
            accessor.sort_items(self.tie_break.as_ref(), false);
            let items: Vec<DataItem> = accessor.items().to_vec();
            self.virgin = false;
            debug!(
                stream = %self.stream_key,
                file = %pending.descriptor.file_name(),
                items = items.len(),
                "stream file loaded"
            );

            let mut idx = self.initial_cursor(&items);
            if let Some(restore) = self.restore.take() {
                idx = self.apply_restore(&items, idx, &restore, notify);
            }

            if idx >= 0 && idx < items.len() as isize {
                self.state = ReaderState::Online {
                    file: pending,
                    items,
                    idx,
                };
                return Ok(true);
            }

            // Nothing at or past the resume point in this file; move on.
            let file = pending;
            self.chain_to_next_file(&file)?;
        }
    }

    /// Index of the first item at-or-after (or, when the anchor is
    /// exclusive, strictly after) the anchor in reading order.
    fn initial_cursor(&self, items: &[DataItem]) -> isize {
        match (self.direction, self.anchor_exclusive) {
            (Direction::Forward, false) => {
                items.partition_point(|item| item.timestamp() < self.anchor) as isize
            }
            (Direction::Forward, true) => {
                items.partition_point(|item| item.timestamp() <= self.anchor) as isize
            }
            (Direction::Backward, false) => {
                items.partition_point(|item| item.timestamp() <= self.anchor) as isize - 1
            }
            (Direction::Backward, true) => {
                items.partition_point(|item| item.timestamp() < self.anchor) as isize - 1
            }
        }
    }

    /// Skips past the duplicates recorded in an exact position, verifying
    /// the final item's hash. On failure the cursor lands on the first item
    /// strictly after the recorded time and a warning is emitted; reading
    /// never aborts.
    fn apply_restore(
        &mut self,
        items: &[DataItem],
        start: isize,
        restore: &FolderReadingPosition,
        notify: &mut dyn FnMut(RestoreWarning),
    ) -> isize {
        let step = self.step();
        let mut idx = start;
        let mut remaining = restore.count_at_time;
        let mut found = false;

        while remaining > 0 {
            let item = match usize::try_from(idx).ok().and_then(|i| items.get(i)) {
                Some(item) if item.timestamp() == restore.time => item,
                _ => break,
            };
            remaining -= 1;
            if remaining == 0 {
                if item.business_hash() != restore.verification_hash {
                    notify(RestoreWarning::HashMismatch {
                        stream_key: self.stream_key.clone(),
                        time: restore.time,
                        expected: restore.verification_hash,
                        actual: item.business_hash(),
                    });
                }
                found = true;
            }
            idx += step;
        }

        if found {
            // Continue the duplicate ordinal count from the restored state.
            self.position = restore.clone();
        } else {
            notify(RestoreWarning::ItemNotFound {
                stream_key: self.stream_key.clone(),
                time: restore.time,
                count_at_time: restore.count_at_time,
            });
            // First item strictly after the recorded time in reading order.
            idx = start;
            while let Some(item) = usize::try_from(idx).ok().and_then(|i| items.get(i)) {
                if item.timestamp() != restore.time {
                    break;
                }
                idx += step;
            }
        }
        idx
    }
}
