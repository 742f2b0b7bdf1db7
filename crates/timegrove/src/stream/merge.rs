//! K-way chronological merge over independent stream readers.
//!
//! Every participating stream sits in exactly one of three sets:
//!
//! - **online**: file loaded, has a current item; sorted by the current
//!   item in reading order,
//! - **offline**: next file located but not loaded; sorted by the file's
//!   *potential* first timestamp,
//! - **exhausted**: no more data in the current direction.
//!
//! Deferred loading is the point: only streams actually about to yield
//! data are materialized into memory.

use std::cmp::Ordering;

use tracing::warn;

use crate::error::{Result, RestoreWarning, StoreError};
use crate::item::{compare_items, DataItem, TieBreak, Timestamp};
use crate::registry::SessionHandle;
use crate::stream::{Direction, ReadingPosition, StreamReader};

/// Merges N single-stream readers into one globally ordered sequence.
///
/// Not thread-safe: a merge reader is a single sequential cursor.
pub struct MergeReader {
    streams: Vec<StreamReader>,
    online: Vec<usize>,
    offline: Vec<usize>,
    exhausted: Vec<usize>,
    direction: Direction,
    tie_break: Option<TieBreak>,
    /// Timestamp of the last read item, or the last seek time.
    last_time: Timestamp,
    _session: Option<SessionHandle>,
}

impl MergeReader {
    /// Creates a merge over the given streams. The reader yields nothing
    /// until the first [`seek`](Self::seek).
    pub fn new(streams: Vec<StreamReader>, tie_break: Option<TieBreak>) -> Self {
        let exhausted = (0..streams.len()).collect();
        Self {
            streams,
            online: Vec::new(),
            offline: Vec::new(),
            exhausted,
            direction: Direction::Forward,
            tie_break,
            last_time: 0,
            _session: None,
        }
    }

    /// Attaches the registry session that tracks this reader; dropping the
    /// reader releases it.
    pub(crate) fn with_session(mut self, session: SessionHandle) -> Self {
        self._session = Some(session);
        self
    }

    /// Current reading direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// True when any stream may still yield items.
    pub fn has_data(&self) -> bool {
        !self.online.is_empty() || !self.offline.is_empty()
    }

    /// Counts of (online, offline, exhausted) streams.
    pub fn stream_states(&self) -> (usize, usize, usize) {
        (
            self.online.len(),
            self.offline.len(),
            self.exhausted.len(),
        )
    }

    /// Serializable snapshot of the aggregate cursor: the direction, the
    /// last read (or seek) time, and every stream's own position.
    pub fn position(&self) -> ReadingPosition {
        let mut position = ReadingPosition::relative(self.last_time, self.direction);
        for stream in &self.streams {
            let folder = stream.position();
            position.folders.insert(folder.stream_key.clone(), folder);
        }
        position
    }

    /// Positions every stream at `time` in the current direction.
    pub fn seek(&mut self, time: Timestamp) -> Result<()> {
        let direction = self.direction;
        for stream in &mut self.streams {
            stream.seek_from(time, direction)?;
        }
        self.last_time = time;
        self.rebuild_sets();
        self.resync(&mut log_warning)
    }

    /// Restores a previously captured position.
    ///
    /// Streams with an exact recorded position are loaded and verified
    /// right away, so every [`RestoreWarning`] reaches `notify` before this
    /// method returns; streams with only a relative position stay offline
    /// until the merge needs them.
    pub fn seek_position(
        &mut self,
        position: &ReadingPosition,
        notify: &mut dyn FnMut(RestoreWarning),
    ) -> Result<()> {
        self.direction = position.direction;
        let direction = self.direction;
        for stream in &mut self.streams {
            match position.folders.get(stream.stream_key()) {
                Some(folder) if folder.is_exact() => {
                    stream.seek_exact_from(folder, direction)?;
                    stream.load_pending(notify)?;
                }
                Some(folder) => stream.seek_from(folder.time, direction)?,
                None => stream.seek_from(position.time, direction)?,
            }
        }
        self.last_time = position.time;
        self.rebuild_sets();
        self.resync(notify)
    }

    /// Reverses the reading direction.
    ///
    /// Only legal while sequential: a stream holding a seek result that has
    /// never been loaded since the direction last changed makes the merge
    /// non-sequential, and reversal reports an operation-order error.
    pub fn set_direction(&mut self, direction: Direction) -> Result<()> {
        if direction == self.direction {
            return Ok(());
        }
        if let Some(stream) = self.streams.iter().find(|s| !s.is_sequential()) {
            return Err(StoreError::OperationOrder(format!(
                "cannot change direction: stream '{}' has an unloaded seek result",
                stream.stream_key()
            )));
        }
        for stream in &mut self.streams {
            stream.reverse()?;
        }
        self.direction = direction;
        self.rebuild_sets();
        self.resync(&mut log_warning)
    }

    /// Reads the globally next item, or `None` when every stream is done.
    pub fn read(&mut self) -> Result<Option<DataItem>> {
        self.resync(&mut log_warning)?;
        let Some(&head) = self.online.first() else {
            return Ok(None);
        };

        let item = self.streams[head].consume()?;
        self.last_time = item.timestamp();

        if self.streams[head].is_online() {
            self.bubble_head();
        } else {
            self.online.remove(0);
            if self.streams[head].is_offline() {
                self.insert_offline(head);
            } else {
                self.exhausted.push(head);
            }
        }

        self.resync(&mut log_warning)?;
        Ok(Some(item))
    }

    /// Compares two items in reading order.
    fn in_reading_order(&self, a: &DataItem, b: &DataItem) -> Ordering {
        let ordering = compare_items(a, b, self.tie_break.as_ref());
        match self.direction {
            Direction::Forward => ordering,
            Direction::Backward => ordering.reverse(),
        }
    }

    fn current_of(&self, slot: usize) -> Result<&DataItem> {
        self.streams[slot]
            .current()
            .ok_or_else(|| StoreError::Consistency("online stream without current item".into()))
    }

    /// After an advance only the head can be out of order; re-insert it by
    /// linear scan from the second position.
    fn bubble_head(&mut self) {
        let mut i = 0;
        while i + 1 < self.online.len() {
            let a = self.streams[self.online[i]].current();
            let b = self.streams[self.online[i + 1]].current();
            let (Some(a), Some(b)) = (a, b) else { break };
            if self.in_reading_order(a, b) == Ordering::Greater {
                self.online.swap(i, i + 1);
                i += 1;
            } else {
                break;
            }
        }
    }

    fn insert_online(&mut self, slot: usize) -> Result<()> {
        let item = self.current_of(slot)?.clone();
        let pos = {
            let mut pos = self.online.len();
            for (i, &other) in self.online.iter().enumerate() {
                let other_item = self.current_of(other)?;
                if self.in_reading_order(&item, other_item) == Ordering::Less {
                    pos = i;
                    break;
                }
            }
            pos
        };
        self.online.insert(pos, slot);
        Ok(())
    }

    fn insert_offline(&mut self, slot: usize) {
        let Some(pot) = self.streams[slot].potential_timestamp() else {
            self.exhausted.push(slot);
            return;
        };
        let better = |a: Timestamp, b: Timestamp| match self.direction {
            Direction::Forward => a < b,
            Direction::Backward => a > b,
        };
        let pos = self
            .offline
            .iter()
            .position(|&other| {
                let other_pot = self.streams[other]
                    .potential_timestamp()
                    .unwrap_or(match self.direction {
                        Direction::Forward => Timestamp::MAX,
                        Direction::Backward => Timestamp::MIN,
                    });
                better(pot, other_pot)
            })
            .unwrap_or(self.offline.len());
        self.offline.insert(pos, slot);
    }

    /// Re-derives the three sets from every stream's state.
    fn rebuild_sets(&mut self) {
        self.online.clear();
        self.offline.clear();
        self.exhausted.clear();
        for slot in 0..self.streams.len() {
            if self.streams[slot].is_online() {
                // Errors are impossible here: the stream is online.
                let _ = self.insert_online(slot);
            } else if self.streams[slot].is_offline() {
                self.insert_offline(slot);
            } else {
                self.exhausted.push(slot);
            }
        }
    }

    /// Pulls offline streams online while their potential timestamp beats
    /// (or, when a tie-break comparator is configured, ties with) the
    /// online head, loading their files. A stream whose load yields no
    /// further data moves to exhausted.
    fn resync(&mut self, notify: &mut dyn FnMut(RestoreWarning)) -> Result<()> {
        loop {
            let Some(&head_off) = self.offline.first() else {
                return Ok(());
            };
            let Some(pot) = self.streams[head_off].potential_timestamp() else {
                self.offline.remove(0);
                self.exhausted.push(head_off);
                continue;
            };

            let pull = match self.online.first() {
                None => true,
                Some(&head_on) => {
                    let cur = self.current_of(head_on)?.timestamp();
                    let strictly_better = match self.direction {
                        Direction::Forward => pot < cur,
                        Direction::Backward => pot > cur,
                    };
                    // With a comparator configured, equal-timestamp streams
                    // must be loaded too so ordering among simultaneous
                    // items stays deterministic.
                    strictly_better || (pot == cur && self.tie_break.is_some())
                }
            };
            if !pull {
                return Ok(());
            }

            self.offline.remove(0);
            if self.streams[head_off].load_pending(notify)? {
                self.insert_online(head_off)?;
            } else if self.streams[head_off].is_offline() {
                self.insert_offline(head_off);
            } else {
                self.exhausted.push(head_off);
            }
        }
    }
}

/// Fallback warning sink for loads outside a position-restoring seek.
fn log_warning(warning: RestoreWarning) {
    warn!(?warning, "position restore warning");
}
