//! Core value types: tick timestamps, time ranges, and data items.

use std::cmp::Ordering;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::{Result, StoreError};

/// A point in time, measured as a signed count of 100-nanosecond ticks.
///
/// The epoch is up to the caller; the store only requires that ticks are
/// totally ordered and monotonic per writer.
pub type Timestamp = i64;

/// Ticks per microsecond.
pub const TICKS_PER_MICROSECOND: i64 = 10;
/// Ticks per millisecond.
pub const TICKS_PER_MILLISECOND: i64 = 10_000;
/// Ticks per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;
/// Ticks per hour.
pub const TICKS_PER_HOUR: i64 = 3600 * TICKS_PER_SECOND;
/// Ticks per day.
pub const TICKS_PER_DAY: i64 = 24 * TICKS_PER_HOUR;

/// A half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub start: Timestamp,
    /// Exclusive upper bound.
    pub end: Timestamp,
}

impl TimeRange {
    /// Creates a new range. `end` must not precede `start`.
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start <= end, "range start {} after end {}", start, end);
        Self { start, end }
    }

    /// The range covering every representable timestamp.
    pub fn all() -> Self {
        Self {
            start: Timestamp::MIN,
            end: Timestamp::MAX,
        }
    }

    /// Returns true if `ts` falls inside the range.
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Returns true if the two ranges share any timestamp.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if the range contains no timestamps.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Intersects two ranges; the result may be empty.
    pub fn clamp_to(&self, outer: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.max(outer.start),
            end: self.end.min(outer.end),
        }
    }
}

/// Optional comparator ordering items that share a timestamp.
///
/// Without one, the order of equal-timestamp items coming from different
/// streams is not guaranteed stable across runs.
pub type TieBreak = Arc<dyn Fn(&DataItem, &DataItem) -> Ordering + Send + Sync>;

/// Compares two items by timestamp, then by the optional tie-break.
pub fn compare_items(a: &DataItem, b: &DataItem, tie_break: Option<&TieBreak>) -> Ordering {
    match a.timestamp().cmp(&b.timestamp()) {
        Ordering::Equal => match tie_break {
            Some(tb) => tb(a, b),
            None => Ordering::Equal,
        },
        other => other,
    }
}

/// A single timestamped record. Immutable once written.
///
/// The `business_hash` is a stable, non-cryptographic identity hash used to
/// verify resumed reading positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItem {
    timestamp: Timestamp,
    routing_key: String,
    payload: Vec<u8>,
    business_hash: u64,
}

impl DataItem {
    /// Creates an item, deriving the business hash from its content.
    pub fn new(routing_key: impl Into<String>, timestamp: Timestamp, payload: Vec<u8>) -> Self {
        let routing_key = routing_key.into();
        let business_hash = Self::content_hash(&routing_key, timestamp, &payload);
        Self {
            timestamp,
            routing_key,
            payload,
            business_hash,
        }
    }

    /// Creates an item with a caller-supplied business hash.
    pub fn with_hash(
        routing_key: impl Into<String>,
        timestamp: Timestamp,
        payload: Vec<u8>,
        business_hash: u64,
    ) -> Self {
        Self {
            timestamp,
            routing_key: routing_key.into(),
            payload,
            business_hash,
        }
    }

    /// Stable identity hash over routing key, timestamp, and payload.
    fn content_hash(routing_key: &str, timestamp: Timestamp, payload: &[u8]) -> u64 {
        let mut buf = Vec::with_capacity(routing_key.len() + 8 + payload.len());
        buf.extend_from_slice(routing_key.as_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(payload);
        xxhash_rust::xxh64::xxh64(&buf, 0)
    }

    /// The item's timestamp ticks.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// The key selecting the target logical stream.
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// The opaque payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The stable identity hash.
    pub fn business_hash(&self) -> u64 {
        self.business_hash
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        8 + 8 + 2 + self.routing_key.len() + 4 + self.payload.len()
    }

    /// Writes the item using little-endian byte order.
    ///
    /// Layout: `[i64 timestamp][u64 business_hash][u16 key_len][key bytes]
    /// [u32 payload_len][payload]`.
    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.timestamp.to_le_bytes())?;
        writer.write_all(&self.business_hash.to_le_bytes())?;
        let key = self.routing_key.as_bytes();
        writer.write_all(&(key.len() as u16).to_le_bytes())?;
        writer.write_all(key)?;
        writer.write_all(&(self.payload.len() as u32).to_le_bytes())?;
        writer.write_all(&self.payload)?;
        Ok(())
    }

    /// Reads one item using little-endian byte order.
    pub fn decode_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf8 = [0u8; 8];
        reader.read_exact(&mut buf8)?;
        let timestamp = i64::from_le_bytes(buf8);

        reader.read_exact(&mut buf8)?;
        let business_hash = u64::from_le_bytes(buf8);

        let mut buf2 = [0u8; 2];
        reader.read_exact(&mut buf2)?;
        let key_len = u16::from_le_bytes(buf2) as usize;
        let mut key_bytes = vec![0u8; key_len];
        reader.read_exact(&mut key_bytes)?;
        let routing_key = String::from_utf8(key_bytes)
            .map_err(|e| StoreError::Consistency(format!("invalid UTF-8 in routing key: {}", e)))?;

        let mut buf4 = [0u8; 4];
        reader.read_exact(&mut buf4)?;
        let payload_len = u32::from_le_bytes(buf4) as usize;
        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload)?;

        Ok(Self {
            timestamp,
            routing_key,
            payload,
            business_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_contains_half_open() {
        let range = TimeRange::new(10, 20);
        assert!(range.contains(10));
        assert!(range.contains(19));
        assert!(!range.contains(20));
        assert!(!range.contains(9));
    }

    #[test]
    fn test_range_overlap() {
        let a = TimeRange::new(0, 10);
        let b = TimeRange::new(10, 20);
        let c = TimeRange::new(9, 11);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn test_item_encode_decode() {
        let item = DataItem::new("prices", 123_456, vec![1, 2, 3, 4]);
        let mut buf = Vec::new();
        item.encode_to(&mut buf).unwrap();
        assert_eq!(buf.len(), item.encoded_len());

        let decoded = DataItem::decode_from(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn test_business_hash_is_stable() {
        let a = DataItem::new("k", 5, vec![9, 9]);
        let b = DataItem::new("k", 5, vec![9, 9]);
        assert_eq!(a.business_hash(), b.business_hash());

        let c = DataItem::new("k", 6, vec![9, 9]);
        assert_ne!(a.business_hash(), c.business_hash());
    }

    #[test]
    fn test_compare_items_with_tie_break() {
        let a = DataItem::new("a", 5, vec![]);
        let b = DataItem::new("b", 5, vec![]);
        assert_eq!(compare_items(&a, &b, None), Ordering::Equal);

        let by_key: TieBreak = Arc::new(|x, y| x.routing_key().cmp(y.routing_key()));
        assert_eq!(compare_items(&a, &b, Some(&by_key)), Ordering::Less);
    }
}
