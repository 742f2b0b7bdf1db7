//! The set of non-overlapping data files owned by one leaf folder.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::error::{Result, StoreError};
use crate::file::FileDescriptor;
use crate::item::{TimeRange, Timestamp};

/// The three files surrounding a timestamp within one container.
#[derive(Debug, Clone, Default)]
pub struct FileTriple {
    /// Nearest file entirely before the timestamp.
    pub predecessor: Option<FileDescriptor>,
    /// The file covering the timestamp, if any.
    pub owner: Option<FileDescriptor>,
    /// Nearest file entirely after the timestamp.
    pub successor: Option<FileDescriptor>,
}

/// Ordered collection of the files in one leaf, keyed by start time.
///
/// No two contained files may overlap. This is the central correctness
/// invariant of the store: it guarantees a timestamp maps to at most one
/// file, which is what makes seeking, merging, and resuming deterministic.
/// [`file_added`](Self::file_added) and [`file_changed`](Self::file_changed)
/// are the last line of defense and reject any violating descriptor.
#[derive(Debug, Clone)]
pub struct FileContainer {
    /// The owning leaf's range; registered files must stay inside it.
    range: TimeRange,
    files: BTreeMap<Timestamp, FileDescriptor>,
}

impl FileContainer {
    /// Creates an empty container for a leaf covering `range`.
    pub fn new(range: TimeRange) -> Self {
        Self {
            range,
            files: BTreeMap::new(),
        }
    }

    /// The owning leaf's range.
    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// Number of registered files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True when no files are registered.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates descriptors in start-time order.
    pub fn iter(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.files.values()
    }

    /// The earliest file.
    pub fn first(&self) -> Option<&FileDescriptor> {
        self.files.values().next()
    }

    /// The latest file.
    pub fn last(&self) -> Option<&FileDescriptor> {
        self.files.values().next_back()
    }

    /// The file covering `ts`, if any.
    pub fn owner(&self, ts: Timestamp) -> Option<&FileDescriptor> {
        self.files
            .range(..=ts)
            .next_back()
            .map(|(_, desc)| desc)
            .filter(|desc| desc.covers(ts))
    }

    /// The latest file lying entirely before `ts` (`last < ts`).
    pub fn predecessor(&self, ts: Timestamp) -> Option<&FileDescriptor> {
        self.files
            .range(..ts)
            .rev()
            .map(|(_, desc)| desc)
            .find(|desc| desc.last_timestamp() < ts)
    }

    /// The earliest file lying entirely after `ts` (`first > ts`).
    pub fn successor(&self, ts: Timestamp) -> Option<&FileDescriptor> {
        self.files
            .range((Bound::Excluded(ts), Bound::Unbounded))
            .next()
            .map(|(_, desc)| desc)
    }

    /// The file covering `ts`, else the nearest file on the requested side.
    pub fn get_file(&self, ts: Timestamp, backwards: bool) -> Option<&FileDescriptor> {
        self.owner(ts).or_else(|| {
            if backwards {
                self.predecessor(ts)
            } else {
                self.successor(ts)
            }
        })
    }

    /// The predecessor, owner, and successor files around `ts`.
    pub fn get_triple(&self, ts: Timestamp) -> FileTriple {
        FileTriple {
            predecessor: self.predecessor(ts).cloned(),
            owner: self.owner(ts).cloned(),
            successor: self.successor(ts).cloned(),
        }
    }

    /// Returns the registered file that would overlap `desc`, if any.
    fn find_overlap(&self, desc: &FileDescriptor) -> Option<&FileDescriptor> {
        if let Some((_, prev)) = self.files.range(..=desc.first_timestamp()).next_back() {
            if prev.overlaps(desc) {
                return Some(prev);
            }
        }
        if let Some((_, next)) = self
            .files
            .range((Bound::Excluded(desc.first_timestamp()), Bound::Unbounded))
            .next()
        {
            if next.overlaps(desc) {
                return Some(next);
            }
        }
        None
    }

    fn overlap_error(new: &FileDescriptor, existing: &FileDescriptor) -> StoreError {
        StoreError::Overlap {
            new_first: new.first_timestamp(),
            new_last: new.last_timestamp(),
            existing_first: existing.first_timestamp(),
            existing_last: existing.last_timestamp(),
        }
    }

    /// Registers a newly written file.
    ///
    /// Fails with an overlap error when the descriptor intersects any
    /// registered file; the container is unchanged in that case.
    pub fn file_added(&mut self, desc: FileDescriptor) -> Result<()> {
        if let Some(existing) = self.find_overlap(&desc) {
            return Err(Self::overlap_error(&desc, existing));
        }
        self.files.insert(desc.first_timestamp(), desc);
        Ok(())
    }

    /// Replaces the registration of `old` with `new` after a rewrite.
    ///
    /// Fails with a consistency error when `old` is not registered, and with
    /// an overlap error (leaving `old` registered) when `new` intersects a
    /// remaining file.
    pub fn file_changed(&mut self, old: &FileDescriptor, new: FileDescriptor) -> Result<()> {
        let removed = match self.files.get(&old.first_timestamp()) {
            Some(existing) if existing == old => {
                self.files.remove(&old.first_timestamp()).unwrap_or_else(|| {
                    unreachable!("entry checked above")
                })
            }
            _ => {
                return Err(StoreError::Consistency(format!(
                    "changed file {} is not registered",
                    old.file_name()
                )))
            }
        };
        if let Some(existing) = self.find_overlap(&new) {
            let err = Self::overlap_error(&new, existing);
            self.files.insert(removed.first_timestamp(), removed);
            return Err(err);
        }
        self.files.insert(new.first_timestamp(), new);
        Ok(())
    }

    /// Unregisters a deleted file.
    ///
    /// Fails with a consistency error when the descriptor is not registered;
    /// that signals the in-memory index and disk have diverged.
    pub fn file_deleted(&mut self, desc: &FileDescriptor) -> Result<()> {
        match self.files.get(&desc.first_timestamp()) {
            Some(existing) if existing == desc => {
                self.files.remove(&desc.first_timestamp());
                Ok(())
            }
            _ => Err(StoreError::Consistency(format!(
                "deleted file {} is not registered",
                desc.file_name()
            ))),
        }
    }
}
