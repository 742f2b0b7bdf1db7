//! The embedding surface: folder management and session construction.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::codec::CoderRegistry;
use crate::error::{Result, StoreError};
use crate::item::TieBreak;
use crate::registry::SessionRegistry;
use crate::settings::FolderSettings;
use crate::stream::{MergeReader, StreamReader, StreamWriter};
use crate::tree::{CalendarIndex, TimeIndex};

/// Path-length budget for a stream folder, leaving room for the calendar
/// subtree and a file name.
const MAX_FOLDER_PATH: usize = 240;

/// Construction options for a [`TimeStore`].
pub struct StoreOptions {
    /// Codec lookup used for reading and writing file bodies.
    pub coders: CoderRegistry,
    /// Store-wide default folder settings.
    pub defaults: FolderSettings,
    /// The partitioning index; calendar-shaped by default.
    pub index: Arc<dyn TimeIndex>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            coders: CoderRegistry::default(),
            defaults: FolderSettings::default(),
            index: Arc::new(CalendarIndex::new()),
        }
    }
}

/// An embedded, append-mostly time-series store.
///
/// Data items live in named logical streams ("folders"), each backed by a
/// calendar-partitioned tree of data files under the store root. Readers
/// and writers are independent sequential cursors; the store tracks them in
/// a session registry to enforce single-writer-per-stream and to refuse
/// structural changes to folders that are in use.
pub struct TimeStore {
    root: PathBuf,
    index: Arc<dyn TimeIndex>,
    coders: Arc<CoderRegistry>,
    sessions: SessionRegistry,
    defaults: FolderSettings,
    folder_settings: RwLock<HashMap<String, FolderSettings>>,
}

impl TimeStore {
    /// Opens (creating if needed) a store at `root` with default options.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_options(root, StoreOptions::default())
    }

    /// Opens a store with explicit options.
    pub fn with_options(root: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            index: options.index,
            coders: Arc::new(options.coders),
            sessions: SessionRegistry::new(),
            defaults: options.defaults,
            folder_settings: RwLock::new(HashMap::new()),
        })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates a stream key: `/`-separated components of letters, digits,
    /// `-`, `_` and `.`, none empty, dot-only, or all digits (digit-only
    /// names are reserved for the time index), within the path budget.
    pub fn validate_stream_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(StoreError::Validation("stream key is empty".into()));
        }
        for component in key.split('/') {
            if component.is_empty() {
                return Err(StoreError::Validation(format!(
                    "stream key '{}' has an empty component",
                    key
                )));
            }
            if component.bytes().all(|b| b == b'.') {
                return Err(StoreError::Validation(format!(
                    "stream key component '{}' is reserved",
                    component
                )));
            }
            if component.bytes().all(|b| b.is_ascii_digit()) {
                return Err(StoreError::Validation(format!(
                    "stream key component '{}' is all digits, reserved for the time index",
                    component
                )));
            }
            if !component
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
            {
                return Err(StoreError::Validation(format!(
                    "stream key component '{}' has unsupported characters",
                    component
                )));
            }
        }
        if self.root.as_os_str().len() + 1 + key.len() > MAX_FOLDER_PATH {
            return Err(StoreError::Validation(format!(
                "stream key '{}' exceeds the path length budget",
                key
            )));
        }
        Ok(())
    }

    fn folder_dir(&self, key: &str) -> PathBuf {
        let mut dir = self.root.clone();
        dir.extend(key.split('/'));
        dir
    }

    /// True when the folder exists on disk.
    pub fn folder_exists(&self, key: &str) -> bool {
        self.validate_stream_key(key).is_ok() && self.folder_dir(key).is_dir()
    }

    /// Creates a logical stream folder (and missing parents).
    pub fn create_folder(&self, key: &str) -> Result<()> {
        self.validate_stream_key(key)?;
        fs::create_dir_all(self.folder_dir(key))?;
        debug!(key, "created folder");
        Ok(())
    }

    /// Deletes a folder and all its data.
    ///
    /// Refused while any reader or writer is active against the folder or
    /// one of its descendants.
    pub fn delete_folder(&self, key: &str) -> Result<()> {
        self.validate_stream_key(key)?;
        if self.sessions.any_active_under(key) {
            return Err(StoreError::Validation(format!(
                "folder '{}' is in use by an active session",
                key
            )));
        }
        let dir = self.folder_dir(key);
        if !dir.is_dir() {
            return Err(StoreError::Validation(format!(
                "folder '{}' does not exist",
                key
            )));
        }
        fs::remove_dir_all(dir)?;
        self.folder_settings.write().remove(key);
        debug!(key, "deleted folder");
        Ok(())
    }

    /// Renames (moves) a folder.
    ///
    /// Refused while sessions are active under either name, or when the
    /// target already exists.
    pub fn rename_folder(&self, from: &str, to: &str) -> Result<()> {
        self.validate_stream_key(from)?;
        self.validate_stream_key(to)?;
        if self.sessions.any_active_under(from) || self.sessions.any_active_under(to) {
            return Err(StoreError::Validation(format!(
                "folder '{}' is in use by an active session",
                from
            )));
        }
        let from_dir = self.folder_dir(from);
        let to_dir = self.folder_dir(to);
        if !from_dir.is_dir() {
            return Err(StoreError::Validation(format!(
                "folder '{}' does not exist",
                from
            )));
        }
        if to_dir.exists() {
            return Err(StoreError::Validation(format!(
                "folder '{}' already exists",
                to
            )));
        }
        if let Some(parent) = to_dir.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(from_dir, to_dir)?;
        let mut settings = self.folder_settings.write();
        if let Some(moved) = settings.remove(from) {
            settings.insert(to.to_string(), moved);
        }
        debug!(from, to, "renamed folder");
        Ok(())
    }

    /// Lists stream folders, deepest-first keys in `a/b` form. Directories
    /// whose names could belong to the time index are not folders.
    pub fn list_folders(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let root = self.root.clone();
        self.collect_folders(&root, String::new(), &mut keys)?;
        keys.sort();
        Ok(keys)
    }

    fn collect_folders(&self, dir: &Path, prefix: String, keys: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            let key = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", prefix, name)
            };
            keys.push(key.clone());
            self.collect_folders(&entry.path(), key, keys)?;
        }
        Ok(())
    }

    /// Overrides settings for one folder; descendants inherit unset fields.
    pub fn set_folder_settings(&self, key: &str, settings: FolderSettings) -> Result<()> {
        self.validate_stream_key(key)?;
        self.folder_settings.write().insert(key.to_string(), settings);
        Ok(())
    }

    /// Resolves the settings for a folder: its own overrides, then each
    /// ancestor's, then the store defaults.
    pub fn settings_for(&self, key: &str) -> FolderSettings {
        let stored = self.folder_settings.read();
        let mut resolved = self.defaults.clone();
        let mut prefix = String::new();
        for component in key.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);
            if let Some(overrides) = stored.get(&prefix) {
                resolved = overrides.clone().inherit(&resolved);
            }
        }
        resolved
    }

    /// Opens the single writer for a stream, creating the folder if needed.
    pub fn writer(&self, key: &str) -> Result<StreamWriter> {
        self.writer_with(key, None)
    }

    /// Opens a writer with an equal-timestamp tie-break comparator.
    pub fn writer_with(&self, key: &str, tie_break: Option<TieBreak>) -> Result<StreamWriter> {
        self.validate_stream_key(key)?;
        let session = self.sessions.register_writer(key)?;
        let writer = StreamWriter::new(
            key,
            self.folder_dir(key),
            Arc::clone(&self.index),
            Arc::clone(&self.coders),
            self.settings_for(key).resolve(),
            tie_break,
        )?;
        Ok(writer.with_session(session))
    }

    /// Opens a merge reader over one or more existing streams.
    pub fn reader(&self, keys: &[&str]) -> Result<MergeReader> {
        self.reader_with(keys, None)
    }

    /// Opens a merge reader with an equal-timestamp tie-break comparator.
    ///
    /// Without a comparator, the order of equal-timestamp items coming from
    /// different streams is not guaranteed stable across runs.
    pub fn reader_with(&self, keys: &[&str], tie_break: Option<TieBreak>) -> Result<MergeReader> {
        if keys.is_empty() {
            return Err(StoreError::Validation("no streams given".into()));
        }
        for key in keys {
            self.validate_stream_key(key)?;
            if !self.folder_dir(key).is_dir() {
                return Err(StoreError::Validation(format!(
                    "folder '{}' does not exist",
                    key
                )));
            }
        }
        let owned: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let session = self.sessions.register_reader(&owned);
        let streams = keys
            .iter()
            .map(|key| {
                StreamReader::new(
                    *key,
                    self.folder_dir(key),
                    Arc::clone(&self.index),
                    Arc::clone(&self.coders),
                    tie_break.clone(),
                )
            })
            .collect();
        Ok(MergeReader::new(streams, tie_break).with_session(session))
    }
}
