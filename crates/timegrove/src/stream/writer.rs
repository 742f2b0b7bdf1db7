//! Sequential append logic for one logical stream.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{Coder, CoderRegistry};
use crate::error::{Result, StoreError};
use crate::file::FileAccessor;
use crate::item::{DataItem, TieBreak, TimeRange};
use crate::registry::SessionHandle;
use crate::settings::ResolvedSettings;
use crate::tree::{FolderTree, NodeId, TimeIndex};

struct OpenFile {
    accessor: FileAccessor,
    leaf: NodeId,
}

/// Appends items to one logical stream, splitting files by a soft size
/// target.
///
/// Sequential writes fill the open file until the target is reached, then
/// roll to a fresh one. An out-of-order item instead reopens (or creates)
/// the file owning its timestamp with an accept window spanning the gap to
/// the neighboring files, clamped to the leaf — so inserts split the
/// neighbors' acceptance windows rather than ever overlapping them.
///
/// A writer is a single-threaded cursor; wrap it externally for shared use.
pub struct StreamWriter {
    stream_key: String,
    tree: FolderTree,
    registry: Arc<CoderRegistry>,
    settings: ResolvedSettings,
    compressor: Arc<dyn Coder>,
    encryptor: Option<Arc<dyn Coder>>,
    tie_break: Option<TieBreak>,
    open: Option<OpenFile>,
    _session: Option<SessionHandle>,
}

impl StreamWriter {
    /// Creates a writer over the stream rooted at `root_dir`, creating the
    /// directory when missing.
    pub fn new(
        stream_key: impl Into<String>,
        root_dir: impl Into<PathBuf>,
        index: Arc<dyn TimeIndex>,
        registry: Arc<CoderRegistry>,
        settings: ResolvedSettings,
        tie_break: Option<TieBreak>,
    ) -> Result<Self> {
        let root_dir = root_dir.into();
        fs::create_dir_all(&root_dir)?;
        let compressor = registry.require(&settings.compressor_code)?;
        let encryptor = match &settings.encryptor_code {
            Some(code) => Some(registry.require(code)?),
            None => None,
        };
        Ok(Self {
            stream_key: stream_key.into(),
            tree: FolderTree::new(root_dir, index),
            registry,
            settings,
            compressor,
            encryptor,
            tie_break,
            open: None,
            _session: None,
        })
    }

    /// Attaches the registry session that guards this writer's exclusivity;
    /// dropping the writer releases it.
    pub(crate) fn with_session(mut self, session: SessionHandle) -> Self {
        self._session = Some(session);
        self
    }

    /// The stream key this writer serves.
    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    /// Buffered items not yet persisted.
    pub fn unsaved_items(&self) -> &[DataItem] {
        self.open
            .as_ref()
            .map(|open| open.accessor.unsaved_items())
            .unwrap_or(&[])
    }

    /// Appends an item.
    ///
    /// The open file keeps receiving items while it is under the soft size
    /// target or the item lands inside its current span; anything else
    /// flushes the open file and relocates through the partition tree.
    pub fn write(&mut self, item: DataItem) -> Result<()> {
        if let Some(open) = &mut self.open {
            let fits = open.accessor.item_count() < self.settings.desired_items_per_file
                || open.accessor.spans(item.timestamp());
            if fits && open.accessor.accept_range().contains(item.timestamp()) {
                if !open.accessor.add(item) {
                    return Err(StoreError::Consistency(
                        "accept window refused an in-window item".into(),
                    ));
                }
                return Ok(());
            }
        }
        self.roll_to(item)
    }

    /// Flushes the open file and relocates the write cursor for `item`.
    fn roll_to(&mut self, item: DataItem) -> Result<()> {
        self.close_current()?;

        let ts = item.timestamp();
        let leaf = self
            .tree
            .get_leaf(ts, true)?
            .ok_or_else(|| StoreError::Consistency("leaf creation yielded no node".into()))?;
        let leaf_range = self.tree.range(leaf);
        let triple = self.tree.container(leaf)?.get_triple(ts);

        let min_accept = triple
            .predecessor
            .as_ref()
            .map(|p| p.end())
            .unwrap_or(leaf_range.start)
            .max(leaf_range.start);
        let max_accept = triple
            .successor
            .as_ref()
            .map(|s| s.first_timestamp())
            .unwrap_or(leaf_range.end)
            .min(leaf_range.end);
        let accept = TimeRange::new(min_accept, max_accept);

        let dir = self.tree.abs_dir(leaf);
        let mut accessor = match triple.owner {
            Some(owner) => {
                debug!(
                    stream = %self.stream_key,
                    file = %owner.file_name(),
                    "reopening owning file for insert"
                );
                let mut accessor = FileAccessor::open(dir, owner, accept, &self.registry)?;
                accessor.load()?;
                accessor
            }
            None => {
                debug!(stream = %self.stream_key, ts, "opening fresh file");
                FileAccessor::create(
                    dir,
                    accept,
                    Arc::clone(&self.compressor),
                    self.encryptor.clone(),
                )
            }
        };

        // The window was derived from the neighbors of this very timestamp;
        // a refusal here means the index lied.
        if !accessor.add(item) {
            return Err(StoreError::Consistency(format!(
                "freshly derived accept window [{}, {}) refused timestamp {}",
                accept.start, accept.end, ts
            )));
        }

        self.open = Some(OpenFile { accessor, leaf });
        Ok(())
    }

    /// Persists any buffered items; the open file stays open for appends.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(open) = &mut self.open {
            let container = self.tree.container_mut(open.leaf)?;
            open.accessor.flush(self.tie_break.as_ref(), container)?;
        }
        Ok(())
    }

    /// Flushes and closes the open file accessor.
    fn close_current(&mut self) -> Result<()> {
        if let Some(mut open) = self.open.take() {
            let container = self.tree.container_mut(open.leaf)?;
            open.accessor.flush(self.tie_break.as_ref(), container)?;
            open.accessor.close();
        }
        Ok(())
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        if !self.unsaved_items().is_empty() {
            warn!(
                stream = %self.stream_key,
                unsaved = self.unsaved_items().len(),
                "writer dropped with unflushed items; call flush() before dropping"
            );
        }
    }
}
