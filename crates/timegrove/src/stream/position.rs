//! Serializable reading positions for suspend/resume.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::item::{DataItem, Timestamp};

/// Reading direction through time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Oldest to newest.
    #[default]
    Forward,
    /// Newest to oldest.
    Backward,
}

impl Direction {
    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }

    /// Returns true when `a` comes at or after `b` in reading order.
    pub fn at_or_after(self, a: Timestamp, b: Timestamp) -> bool {
        match self {
            Self::Forward => a >= b,
            Self::Backward => a <= b,
        }
    }

    /// Returns true when `a` comes strictly before `b` in reading order.
    pub fn before(self, a: Timestamp, b: Timestamp) -> bool {
        match self {
            Self::Forward => a < b,
            Self::Backward => a > b,
        }
    }
}

/// Resumable cursor of one logical stream.
///
/// `count_at_time == 0` means the position is not exact: only a seek time
/// is known, nothing has been read at or after it. Otherwise it is the
/// ordinal, among items sharing `time`, of the last item read — multiple
/// items can share a timestamp and are not otherwise addressable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderReadingPosition {
    /// Key of the logical stream.
    pub stream_key: String,
    /// Timestamp of the last read item, or the seek time when not exact.
    pub time: Timestamp,
    /// 1-based ordinal of the last read item among items sharing `time`;
    /// 0 when not exact.
    pub count_at_time: u32,
    /// Business hash of the last read item, for verification on restore.
    pub verification_hash: u64,
}

impl FolderReadingPosition {
    /// A not-exact position carrying only a seek time.
    pub fn at_time(stream_key: impl Into<String>, time: Timestamp) -> Self {
        Self {
            stream_key: stream_key.into(),
            time,
            count_at_time: 0,
            verification_hash: 0,
        }
    }

    /// True when an item has actually been read at this position.
    pub fn is_exact(&self) -> bool {
        self.count_at_time > 0
    }

    /// Advances the position past a freshly read item.
    pub fn note_read(&mut self, item: &DataItem) {
        if self.is_exact() && item.timestamp() == self.time {
            self.count_at_time += 1;
        } else {
            self.time = item.timestamp();
            self.count_at_time = 1;
        }
        self.verification_hash = item.business_hash();
    }
}

/// Aggregate resumable cursor over a set of streams.
///
/// Either fully precise — `folders` holds every participating stream's
/// position — or relative, carrying only a time and direction that can be
/// replayed against a newly chosen set of streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingPosition {
    /// Reading direction the position was captured in.
    pub direction: Direction,
    /// Timestamp of the last read item, or the seek time.
    pub time: Timestamp,
    /// Per-stream exact positions, empty for a relative position.
    pub folders: BTreeMap<String, FolderReadingPosition>,
}

impl ReadingPosition {
    /// A relative position: time and direction only.
    pub fn relative(time: Timestamp, direction: Direction) -> Self {
        Self {
            direction,
            time,
            folders: BTreeMap::new(),
        }
    }

    /// True when every stream's position is carried.
    pub fn is_precise(&self) -> bool {
        !self.folders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_read_counts_duplicates() {
        let mut pos = FolderReadingPosition::at_time("s", 0);
        assert!(!pos.is_exact());

        pos.note_read(&DataItem::new("s", 5, vec![1]));
        assert_eq!((pos.time, pos.count_at_time), (5, 1));

        pos.note_read(&DataItem::new("s", 5, vec![2]));
        assert_eq!((pos.time, pos.count_at_time), (5, 2));

        pos.note_read(&DataItem::new("s", 7, vec![3]));
        assert_eq!((pos.time, pos.count_at_time), (7, 1));
    }

    #[test]
    fn test_note_read_after_seek_resets_ordinal() {
        // A seek to the same time an item later arrives at must still count
        // from 1: nothing was read at the seek time itself.
        let mut pos = FolderReadingPosition::at_time("s", 5);
        pos.note_read(&DataItem::new("s", 5, vec![]));
        assert_eq!(pos.count_at_time, 1);
    }

    #[test]
    fn test_direction_order_helpers() {
        assert!(Direction::Forward.at_or_after(5, 5));
        assert!(Direction::Forward.before(4, 5));
        assert!(Direction::Backward.at_or_after(4, 5));
        assert!(Direction::Backward.before(6, 5));
    }

    #[test]
    fn test_position_serializes() {
        let mut pos = ReadingPosition::relative(42, Direction::Backward);
        pos.folders.insert(
            "a".into(),
            FolderReadingPosition {
                stream_key: "a".into(),
                time: 42,
                count_at_time: 2,
                verification_hash: 99,
            },
        );
        let json = serde_json::to_string(&pos).unwrap();
        let back: ReadingPosition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pos);
        assert!(back.is_precise());
    }
}
