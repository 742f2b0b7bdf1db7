//! Per-stream configuration with parent fallback.

use crate::codec;

/// Default soft target for items per physical file.
pub const DEFAULT_ITEMS_PER_FILE: usize = 10_000;

/// Settings governing how a logical stream's files are written.
///
/// Every field is optional; unset fields resolve through the parent chain
/// and finally the store defaults. Settings only affect newly written
/// files — existing files record their codecs in their names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderSettings {
    /// Key code of the compression coder.
    pub compressor_code: Option<String>,
    /// Key code of the encryption coder.
    pub encryptor_code: Option<String>,
    /// Whether encryption is applied at all.
    pub encryption_enabled: Option<bool>,
    /// Soft target for items per file; files may exceed it to keep
    /// duplicate-timestamp runs together.
    pub desired_items_per_file: Option<usize>,
}

impl FolderSettings {
    /// Fills unset fields from `parent`.
    pub fn inherit(mut self, parent: &FolderSettings) -> Self {
        if self.compressor_code.is_none() {
            self.compressor_code = parent.compressor_code.clone();
        }
        if self.encryptor_code.is_none() {
            self.encryptor_code = parent.encryptor_code.clone();
        }
        if self.encryption_enabled.is_none() {
            self.encryption_enabled = parent.encryption_enabled;
        }
        if self.desired_items_per_file.is_none() {
            self.desired_items_per_file = parent.desired_items_per_file;
        }
        self
    }

    /// Resolves every field to a concrete value.
    pub fn resolve(&self) -> ResolvedSettings {
        let encryption_enabled = self.encryption_enabled.unwrap_or(false);
        ResolvedSettings {
            compressor_code: self
                .compressor_code
                .clone()
                .unwrap_or_else(|| codec::GZIP_CODE.to_string()),
            encryptor_code: if encryption_enabled {
                self.encryptor_code.clone()
            } else {
                None
            },
            desired_items_per_file: self
                .desired_items_per_file
                .unwrap_or(DEFAULT_ITEMS_PER_FILE)
                .max(1),
        }
    }
}

/// Fully resolved settings consumed by writers and accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    /// Compression coder key code.
    pub compressor_code: String,
    /// Encryption coder key code, `None` when encryption is off.
    pub encryptor_code: Option<String>,
    /// Soft target for items per file, at least 1.
    pub desired_items_per_file: usize,
}
