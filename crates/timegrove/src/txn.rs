//! Staged file replacement with commit/rollback semantics.
//!
//! Writes go to a temporary sibling first; [`CommitScope::complete`] makes
//! them visible via fsync + atomic rename + directory fsync. Dropping an
//! incomplete scope removes the temporary file.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Suffix appended to the final path while a write is staged.
const TMP_SUFFIX: &str = ".tmp";

/// A staged replacement of one file.
pub struct CommitScope {
    final_path: PathBuf,
    tmp_path: PathBuf,
    completed: bool,
}

impl CommitScope {
    /// Begins a staged write targeting `final_path`.
    pub fn begin(final_path: impl Into<PathBuf>) -> Self {
        let final_path = final_path.into();
        let mut tmp_name = final_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(TMP_SUFFIX);
        let tmp_path = final_path.with_file_name(tmp_name);
        Self {
            final_path,
            tmp_path,
            completed: false,
        }
    }

    /// Path the caller writes the staged content to.
    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Path the content lands at after [`complete`](Self::complete).
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Publishes the staged file.
    ///
    /// Sequence: fsync the temp file, fsync its directory, atomic rename,
    /// fsync the directory again so the rename itself is durable.
    pub fn complete(mut self) -> Result<()> {
        {
            let file = File::open(&self.tmp_path)?;
            file.sync_all()?;
        }
        if let Some(dir) = self.final_path.parent() {
            let dir_file = File::open(dir)?;
            dir_file.sync_all()?;
        }
        fs::rename(&self.tmp_path, &self.final_path)?;
        if let Some(dir) = self.final_path.parent() {
            let dir_file = File::open(dir)?;
            dir_file.sync_all()?;
        }
        self.completed = true;
        Ok(())
    }
}

impl Drop for CommitScope {
    fn drop(&mut self) {
        if !self.completed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_complete_publishes_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("data.bin");

        let scope = CommitScope::begin(&target);
        fs::write(scope.tmp_path(), b"payload").unwrap();
        scope.complete().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"payload");
        assert!(!dir.path().join("data.bin.tmp").exists());
    }

    #[test]
    fn test_drop_removes_staged_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("data.bin");

        {
            let scope = CommitScope::begin(&target);
            fs::write(scope.tmp_path(), b"half-written").unwrap();
        }

        assert!(!target.exists());
        assert!(!dir.path().join("data.bin.tmp").exists());
    }
}
