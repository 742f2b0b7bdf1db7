//! Pure mapping between timestamps, tree levels, and folder names.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::item::{TimeRange, Timestamp, TICKS_PER_DAY, TICKS_PER_HOUR};

/// Pure function layer locating the folder covering a timestamp at a level.
///
/// Implementations must guarantee:
/// - totality: every timestamp maps to exactly one range at every level;
/// - monotonic containment: the level-`L` range contains the level-`L-1`
///   range for the same timestamp;
/// - stable depth: [`levels`](Self::levels) is fixed for a configuration,
///   with a top level wide enough to make the tree unambiguous.
pub trait TimeIndex: Send + Sync {
    /// Number of levels below the virtual root. Leaves are level 0.
    fn levels(&self) -> u32;

    /// The range covered by the level-`level` folder owning `ts`.
    fn range_at(&self, level: u32, ts: Timestamp) -> TimeRange;

    /// Directory name of the level-`level` folder owning `ts`.
    fn dir_name(&self, level: u32, ts: Timestamp) -> String;

    /// Inverse mapping: resolves a child directory name against its parent's
    /// range. Returns `None` for names that are not index folders.
    fn parse_child(&self, parent: TimeRange, child_level: u32, name: &str) -> Option<TimeRange>;
}

/// Entries kept in the range cache before it is reset.
const RANGE_CACHE_LIMIT: usize = 4096;

/// Calendar-shaped index: year / month / day / hour, four levels deep.
///
/// Level 3 folders are years, level 2 months, level 1 days, level 0 hours;
/// physical files live in the hour directories. The proleptic Gregorian
/// conversion works for pre-epoch timestamps via floor division.
pub struct CalendarIndex {
    /// Memo of `(level, hour-aligned start) -> range`; the mapping is pure
    /// and hit constantly while a writer stays inside one hour.
    cache: Mutex<HashMap<(u32, Timestamp), TimeRange>>,
}

impl CalendarIndex {
    /// Creates the index.
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn range_uncached(level: u32, ts: Timestamp) -> TimeRange {
        let (year, month, day, hour) = civil_of(ts);
        match level {
            3 => TimeRange::new(ticks_of(year, 1, 1, 0), ticks_of(year + 1, 1, 1, 0)),
            2 => {
                let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
                TimeRange::new(ticks_of(year, month, 1, 0), ticks_of(ny, nm, 1, 0))
            }
            1 => {
                let start = ticks_of(year, month, day, 0);
                TimeRange::new(start, start.saturating_add(TICKS_PER_DAY))
            }
            0 => {
                let start = ticks_of(year, month, day, hour);
                TimeRange::new(start, start.saturating_add(TICKS_PER_HOUR))
            }
            _ => TimeRange::all(),
        }
    }
}

impl Default for CalendarIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeIndex for CalendarIndex {
    fn levels(&self) -> u32 {
        4
    }

    fn range_at(&self, level: u32, ts: Timestamp) -> TimeRange {
        if level >= self.levels() {
            return TimeRange::all();
        }
        let hour_start = align_to_hour(ts);
        let key = (level, hour_start);
        let mut cache = self.cache.lock();
        if let Some(range) = cache.get(&key) {
            return *range;
        }
        let range = Self::range_uncached(level, ts);
        if cache.len() >= RANGE_CACHE_LIMIT {
            cache.clear();
        }
        cache.insert(key, range);
        range
    }

    fn dir_name(&self, level: u32, ts: Timestamp) -> String {
        let (year, month, day, hour) = civil_of(ts);
        match level {
            3 => format!("{:04}", year),
            2 => format!("{:02}", month),
            1 => format!("{:02}", day),
            _ => format!("{:02}", hour),
        }
    }

    fn parse_child(&self, parent: TimeRange, child_level: u32, name: &str) -> Option<TimeRange> {
        let number: i64 = name.parse().ok()?;
        let candidate_ts = match child_level {
            3 => ticks_of(number, 1, 1, 0),
            2 => {
                if name.len() != 2 || !(1..=12).contains(&number) {
                    return None;
                }
                let (year, _, _, _) = civil_of(parent.start);
                ticks_of(year, number as u32, 1, 0)
            }
            1 => {
                if name.len() != 2 || !(1..=31).contains(&number) {
                    return None;
                }
                let (year, month, _, _) = civil_of(parent.start);
                ticks_of(year, month, number as u32, 0)
            }
            0 => {
                if name.len() != 2 || !(0..=23).contains(&number) {
                    return None;
                }
                parent.start.checked_add(number * TICKS_PER_HOUR)?
            }
            _ => return None,
        };

        // The canonical rendering must reproduce the name exactly; this
        // rejects non-existent dates such as day 30 of February.
        if self.dir_name(child_level, candidate_ts) != name {
            return None;
        }
        let range = self.range_at(child_level, candidate_ts);
        if !parent.contains(range.start) {
            return None;
        }
        Some(range)
    }
}

fn align_to_hour(ts: Timestamp) -> Timestamp {
    div_floor(ts, TICKS_PER_HOUR).0 * TICKS_PER_HOUR
}

fn div_floor(value: i64, divisor: i64) -> (i64, i64) {
    let mut quotient = value / divisor;
    let mut remainder = value % divisor;
    if remainder < 0 {
        quotient -= 1;
        remainder += divisor;
    }
    (quotient, remainder)
}

/// Converts ticks to `(year, month, day, hour)` of the proleptic Gregorian
/// calendar.
fn civil_of(ts: Timestamp) -> (i64, u32, u32, u32) {
    let (days, ticks_of_day) = div_floor(ts, TICKS_PER_DAY);
    let hour = (ticks_of_day / TICKS_PER_HOUR) as u32;
    let (year, month, day) = civil_from_days(days);
    (year, month, day, hour)
}

/// Converts a civil date and hour back to ticks, saturating at the
/// representable extremes.
fn ticks_of(year: i64, month: u32, day: u32, hour: u32) -> Timestamp {
    let days = days_from_civil(year, month, day);
    days.saturating_mul(TICKS_PER_DAY)
        .saturating_add(hour as i64 * TICKS_PER_HOUR)
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 {
        z / 146_097
    } else {
        (z - 146_096) / 146_097
    };
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = mp + if mp < 10 { 3 } else { -9 };
    let year = y + if month <= 2 { 1 } else { 0 };
    (year, month as u32, day as u32)
}

fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = year - if month <= 2 { 1 } else { 0 };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let m = month as i64;
    let doy = (153 * (m + if m > 2 { -3 } else { 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
