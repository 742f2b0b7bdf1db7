//! File descriptors: a file's covered timestamp range and codec identifiers,
//! encoded in its name.

use crate::item::{TimeRange, Timestamp};

/// Immutable value describing one physical data file.
///
/// The name is a deterministic encoding of all four fields:
/// `<first_hex>.<last_hex>.<compressor>[.<encryptor>]` with 16-digit
/// lower-case hex tick counts. Parsing is total — a name that does not
/// match is simply not a data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    first_timestamp: Timestamp,
    last_timestamp: Timestamp,
    compressor_code: String,
    encryptor_code: Option<String>,
}

impl FileDescriptor {
    /// Creates a descriptor. `first` must not exceed `last`.
    pub fn new(
        first_timestamp: Timestamp,
        last_timestamp: Timestamp,
        compressor_code: impl Into<String>,
        encryptor_code: Option<String>,
    ) -> Self {
        debug_assert!(
            first_timestamp <= last_timestamp,
            "descriptor first {} after last {}",
            first_timestamp,
            last_timestamp
        );
        Self {
            first_timestamp,
            last_timestamp,
            compressor_code: compressor_code.into(),
            encryptor_code,
        }
    }

    /// First covered timestamp, inclusive.
    pub fn first_timestamp(&self) -> Timestamp {
        self.first_timestamp
    }

    /// Last covered timestamp, inclusive.
    pub fn last_timestamp(&self) -> Timestamp {
        self.last_timestamp
    }

    /// Exclusive upper bound: one tick past the last covered timestamp.
    pub fn end(&self) -> Timestamp {
        self.last_timestamp + 1
    }

    /// The covered range as a half-open interval.
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.first_timestamp, self.end())
    }

    /// Returns true if this file covers `ts`.
    pub fn covers(&self, ts: Timestamp) -> bool {
        ts >= self.first_timestamp && ts <= self.last_timestamp
    }

    /// Returns true if the two files share any timestamp.
    pub fn overlaps(&self, other: &FileDescriptor) -> bool {
        self.first_timestamp <= other.last_timestamp && other.first_timestamp <= self.last_timestamp
    }

    /// Key code of the compression coder the body was written with.
    pub fn compressor_code(&self) -> &str {
        &self.compressor_code
    }

    /// Key code of the encryption coder, if the body is encrypted.
    pub fn encryptor_code(&self) -> Option<&str> {
        self.encryptor_code.as_deref()
    }

    /// Renders the descriptor as its file name.
    pub fn file_name(&self) -> String {
        let mut name = format!(
            "{:016x}.{:016x}.{}",
            self.first_timestamp as u64, self.last_timestamp as u64, self.compressor_code
        );
        if let Some(enc) = &self.encryptor_code {
            name.push('.');
            name.push_str(enc);
        }
        name
    }

    /// Parses a file name back into a descriptor.
    ///
    /// Returns `None` for anything that is not a well-formed data file name;
    /// malformed names are ignored, never an error.
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let mut parts = name.split('.');
        let first_hex = parts.next()?;
        let last_hex = parts.next()?;
        let compressor = parts.next()?;
        let encryptor = parts.next();
        if parts.next().is_some() {
            return None;
        }

        if first_hex.len() != 16 || last_hex.len() != 16 {
            return None;
        }
        let first_timestamp = u64::from_str_radix(first_hex, 16).ok()? as i64;
        let last_timestamp = u64::from_str_radix(last_hex, 16).ok()? as i64;
        if first_timestamp > last_timestamp {
            return None;
        }

        if !is_valid_code(compressor) {
            return None;
        }
        if let Some(enc) = encryptor {
            if !is_valid_code(enc) {
                return None;
            }
        }

        Some(Self {
            first_timestamp,
            last_timestamp,
            compressor_code: compressor.to_string(),
            encryptor_code: encryptor.map(str::to_string),
        })
    }
}

/// A codec key code: short, non-empty, ASCII alphanumeric.
fn is_valid_code(code: &str) -> bool {
    !code.is_empty() && code.len() <= 16 && code.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_roundtrip() {
        let desc = FileDescriptor::new(0x1388, 0x13ec, "gz", None);
        let name = desc.file_name();
        assert_eq!(name, "0000000000001388.00000000000013ec.gz");
        assert_eq!(FileDescriptor::parse_file_name(&name).unwrap(), desc);
    }

    #[test]
    fn test_file_name_roundtrip_with_encryptor() {
        let desc = FileDescriptor::new(1, 2, "raw", Some("xor".to_string()));
        let parsed = FileDescriptor::parse_file_name(&desc.file_name()).unwrap();
        assert_eq!(parsed.encryptor_code(), Some("xor"));
    }

    #[test]
    fn test_negative_timestamps_survive_the_name() {
        let desc = FileDescriptor::new(-5_000, -1, "gz", None);
        let parsed = FileDescriptor::parse_file_name(&desc.file_name()).unwrap();
        assert_eq!(parsed.first_timestamp(), -5_000);
        assert_eq!(parsed.last_timestamp(), -1);
    }

    #[test]
    fn test_malformed_names_are_not_data_files() {
        for name in [
            "",
            "notafile",
            "0000000000001388.00000000000013ec",        // missing codec
            "1388.13ec.gz",                             // not 16 digits
            "0000000000001388.00000000000013ec.",       // empty codec
            "0000000000001388.00000000000013ec.g z",    // bad codec char
            "00000000000013ec.0000000000001388.gz",     // first after last
            "0000000000001388.00000000000013ec.gz.x.y", // too many parts
            "data.bin.tmp",
        ] {
            assert!(
                FileDescriptor::parse_file_name(name).is_none(),
                "{:?} should not parse",
                name
            );
        }
    }

    #[test]
    fn test_end_is_exclusive() {
        let desc = FileDescriptor::new(10, 20, "gz", None);
        assert_eq!(desc.end(), 21);
        assert!(desc.covers(20));
        assert!(!desc.covers(21));
        assert!(desc.range().contains(20));
        assert!(!desc.range().contains(21));
    }

    #[test]
    fn test_overlap_is_inclusive_of_shared_boundary() {
        let a = FileDescriptor::new(0, 10, "gz", None);
        let b = FileDescriptor::new(10, 20, "gz", None);
        let c = FileDescriptor::new(11, 20, "gz", None);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
