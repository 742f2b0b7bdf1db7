//! Compression and encryption codecs applied to file bodies.
//!
//! A [`Coder`] is stateless: it wraps a serialized item list on the way to
//! disk and unwraps it on the way back. On write the order is encryption
//! then compression; reading applies the inverse.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Result, StoreError};

/// A stateless byte-stream codec identified by a stable key code.
///
/// The key code appears in file names, so it must be a short token of
/// ASCII alphanumerics.
pub trait Coder: Send + Sync {
    /// Stable identifier used in file names.
    fn key_code(&self) -> &str;

    /// Encodes a serialized item list for storage.
    fn wrap_encoding(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decodes stored bytes back to the serialized item list.
    fn wrap_decoding(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Key code of the passthrough coder.
pub const RAW_CODE: &str = "raw";

/// Key code of the gzip coder.
pub const GZIP_CODE: &str = "gz";

/// Passthrough coder: stores bytes unmodified.
#[derive(Debug, Default)]
pub struct NopCoder;

impl Coder for NopCoder {
    fn key_code(&self) -> &str {
        RAW_CODE
    }

    fn wrap_encoding(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn wrap_decoding(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Gzip compression coder.
#[derive(Debug, Default)]
pub struct GzipCoder;

impl Coder for GzipCoder {
    fn key_code(&self) -> &str {
        GZIP_CODE
    }

    fn wrap_encoding(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).map_err(|e| StoreError::Codec {
            code: GZIP_CODE.to_string(),
            message: e.to_string(),
        })?;
        encoder.finish().map_err(|e| StoreError::Codec {
            code: GZIP_CODE.to_string(),
            message: e.to_string(),
        })
    }

    fn wrap_decoding(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| StoreError::Codec {
                code: GZIP_CODE.to_string(),
                message: e.to_string(),
            })?;
        Ok(out)
    }
}

/// Lookup table from key code to coder.
///
/// The default set registers the passthrough and gzip coders; callers may
/// register additional coders (an encryption coder, say) before opening
/// streams that reference them.
#[derive(Clone)]
pub struct CoderRegistry {
    coders: HashMap<String, Arc<dyn Coder>>,
}

impl CoderRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            coders: HashMap::new(),
        }
    }

    /// Registers a coder under its key code, replacing any previous entry.
    pub fn register(&mut self, coder: Arc<dyn Coder>) {
        self.coders.insert(coder.key_code().to_string(), coder);
    }

    /// Looks up a coder by key code.
    pub fn get(&self, code: &str) -> Option<Arc<dyn Coder>> {
        self.coders.get(code).cloned()
    }

    /// Looks up a coder, failing with a validation error when unknown.
    pub fn require(&self, code: &str) -> Result<Arc<dyn Coder>> {
        self.get(code)
            .ok_or_else(|| StoreError::Validation(format!("unknown codec '{}'", code)))
    }
}

impl Default for CoderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(NopCoder));
        registry.register(Arc::new(GzipCoder));
        registry
    }
}

impl std::fmt::Debug for CoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut codes: Vec<&str> = self.coders.keys().map(|s| s.as_str()).collect();
        codes.sort_unstable();
        f.debug_struct("CoderRegistry").field("codes", &codes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_roundtrip() {
        let coder = GzipCoder;
        let data: Vec<u8> = (0..10_000u32).flat_map(|i| i.to_le_bytes()).collect();
        let packed = coder.wrap_encoding(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(coder.wrap_decoding(&packed).unwrap(), data);
    }

    #[test]
    fn test_gzip_rejects_garbage() {
        let coder = GzipCoder;
        assert!(coder.wrap_decoding(b"definitely not gzip").is_err());
    }

    #[test]
    fn test_registry_defaults() {
        let registry = CoderRegistry::default();
        assert!(registry.get(RAW_CODE).is_some());
        assert!(registry.get(GZIP_CODE).is_some());
        assert!(registry.require("xchacha").is_err());
    }
}
