//! The sparse partition tree of one logical stream.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]; parent/child
//! links are id lists, never references. Loading is explicit: callers ask
//! for [`FolderTree::ensure_loaded`] and see failures as results instead of
//! hiding them inside property reads.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, StoreError};
use crate::file::FileDescriptor;
use crate::item::{TimeRange, Timestamp};
use crate::tree::{FileContainer, TimeIndex};

/// Arena handle of one partition node.
///
/// Ids stay valid until [`FolderTree::refresh`], which drops the loaded
/// tree and invalidates every previously returned id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A data file located in the tree: its descriptor plus the owning leaf.
#[derive(Debug, Clone)]
pub struct FileRef {
    /// Leaf node the file lives in.
    pub leaf: NodeId,
    /// The file's descriptor.
    pub descriptor: FileDescriptor,
}

/// The three files surrounding a timestamp across the entire tree.
#[derive(Debug, Clone, Default)]
pub struct FileCut {
    /// Nearest file entirely before the timestamp, anywhere in the tree.
    pub predecessor: Option<FileRef>,
    /// The file covering the timestamp.
    pub owner: Option<FileRef>,
    /// Nearest file entirely after the timestamp, anywhere in the tree.
    pub successor: Option<FileRef>,
}

enum NodeState {
    /// Children or files not read from disk yet.
    Unexpanded,
    /// Inner node with child ids sorted by range start.
    Inner(Vec<NodeId>),
    /// Leaf node owning its file container.
    Leaf(FileContainer),
}

struct Node {
    level: u32,
    range: TimeRange,
    rel_path: PathBuf,
    state: NodeState,
}

/// The balanced, timestamp-keyed folder tree of one logical stream.
///
/// The root is virtual — it covers every timestamp and is never
/// materialized on disk. Nodes are created on demand when a write targets
/// an uncovered timestamp, so sibling ranges are disjoint but not
/// contiguous.
pub struct FolderTree {
    root_dir: PathBuf,
    index: Arc<dyn TimeIndex>,
    nodes: Vec<Node>,
    root: NodeId,
}

impl FolderTree {
    /// Creates a tree over `root_dir` using the given folder index.
    pub fn new(root_dir: impl Into<PathBuf>, index: Arc<dyn TimeIndex>) -> Self {
        let root = Node {
            level: index.levels(),
            range: TimeRange::all(),
            rel_path: PathBuf::new(),
            state: NodeState::Unexpanded,
        };
        Self {
            root_dir: root_dir.into(),
            index,
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// The stream's root directory.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// The virtual root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Drops every loaded node. All previously returned ids are invalid
    /// afterwards.
    pub fn refresh(&mut self) {
        self.nodes.clear();
        self.nodes.push(Node {
            level: self.index.levels(),
            range: TimeRange::all(),
            rel_path: PathBuf::new(),
            state: NodeState::Unexpanded,
        });
        self.root = NodeId(0);
    }

    /// The node's covered range.
    pub fn range(&self, id: NodeId) -> TimeRange {
        self.nodes[id.0].range
    }

    /// The node's level; leaves are 0.
    pub fn level(&self, id: NodeId) -> u32 {
        self.nodes[id.0].level
    }

    /// Absolute directory of the node.
    pub fn abs_dir(&self, id: NodeId) -> PathBuf {
        self.root_dir.join(&self.nodes[id.0].rel_path)
    }

    /// The loaded file container of a leaf.
    pub fn container(&self, id: NodeId) -> Result<&FileContainer> {
        match &self.nodes[id.0].state {
            NodeState::Leaf(container) => Ok(container),
            _ => Err(StoreError::OperationOrder(
                "node is not a loaded leaf".into(),
            )),
        }
    }

    /// Mutable access to the loaded file container of a leaf.
    pub fn container_mut(&mut self, id: NodeId) -> Result<&mut FileContainer> {
        match &mut self.nodes[id.0].state {
            NodeState::Leaf(container) => Ok(container),
            _ => Err(StoreError::OperationOrder(
                "node is not a loaded leaf".into(),
            )),
        }
    }

    /// Expands a node from disk.
    ///
    /// A node is either fully expanded at its one child level or not
    /// expanded at all. Reloading reconciles the directory listing against
    /// already-loaded children by range start, preserving the identity of
    /// nodes that still exist; entries that vanished from disk are dropped.
    pub fn ensure_loaded(&mut self, id: NodeId, reload: bool) -> Result<()> {
        let loaded = !matches!(self.nodes[id.0].state, NodeState::Unexpanded);
        if loaded && !reload {
            return Ok(());
        }

        if self.nodes[id.0].level == 0 {
            self.load_leaf(id)
        } else {
            self.load_inner(id)
        }
    }

    fn load_leaf(&mut self, id: NodeId) -> Result<()> {
        let range = self.nodes[id.0].range;
        let dir = self.abs_dir(id);
        let mut container = FileContainer::new(range);

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => Some(entries),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        if let Some(entries) = entries {
            let mut descriptors = Vec::new();
            for entry in entries {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if let Some(desc) = FileDescriptor::parse_file_name(name) {
                    descriptors.push(desc);
                }
            }
            descriptors.sort_by_key(|d| d.first_timestamp());
            for desc in descriptors {
                container.file_added(desc)?;
            }
        }

        debug!(dir = %dir.display(), files = container.len(), "expanded leaf");
        self.nodes[id.0].state = NodeState::Leaf(container);
        Ok(())
    }

    fn load_inner(&mut self, id: NodeId) -> Result<()> {
        let parent_range = self.nodes[id.0].range;
        let parent_rel = self.nodes[id.0].rel_path.clone();
        let child_level = self.nodes[id.0].level - 1;
        let dir = self.abs_dir(id);

        // Existing children keep their ids when the directory still exists.
        let mut existing: Vec<(Timestamp, NodeId)> = match &self.nodes[id.0].state {
            NodeState::Inner(children) => children
                .iter()
                .map(|&c| (self.nodes[c.0].range.start, c))
                .collect(),
            _ => Vec::new(),
        };

        let mut children: Vec<(Timestamp, NodeId)> = Vec::new();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => Some(entries),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        if let Some(entries) = entries {
            for entry in entries {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                let Some(range) = self.index.parse_child(parent_range, child_level, name) else {
                    continue;
                };
                let child = match existing.iter().position(|(start, _)| *start == range.start) {
                    Some(pos) => existing.swap_remove(pos).1,
                    None => self.alloc(Node {
                        level: child_level,
                        range,
                        rel_path: parent_rel.join(name),
                        state: NodeState::Unexpanded,
                    }),
                };
                children.push((range.start, child));
            }
        }

        children.sort_by_key(|(start, _)| *start);
        debug!(
            dir = %dir.display(),
            children = children.len(),
            "expanded folder"
        );
        self.nodes[id.0].state =
            NodeState::Inner(children.into_iter().map(|(_, id)| id).collect());
        Ok(())
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.0].state {
            NodeState::Inner(children) => children,
            _ => &[],
        }
    }

    /// Descends to the leaf covering `ts`, creating missing folders (and
    /// their directories) when `create` is set.
    ///
    /// The returned leaf is loaded and its range covers `ts`; `None` means
    /// no covering leaf exists and creation was not requested.
    pub fn get_leaf(&mut self, ts: Timestamp, create: bool) -> Result<Option<NodeId>> {
        let mut cur = self.root;
        loop {
            if self.nodes[cur.0].level == 0 {
                self.ensure_loaded(cur, false)?;
                debug_assert!(self.nodes[cur.0].range.contains(ts));
                return Ok(Some(cur));
            }
            self.ensure_loaded(cur, false)?;

            let child_level = self.nodes[cur.0].level - 1;
            let covering = self
                .children(cur)
                .iter()
                .copied()
                .find(|&c| self.nodes[c.0].range.contains(ts));

            cur = match covering {
                Some(child) => child,
                None if !create => return Ok(None),
                None => {
                    let range = self.index.range_at(child_level, ts);
                    let name = self.index.dir_name(child_level, ts);
                    let rel = self.nodes[cur.0].rel_path.join(&name);
                    fs::create_dir_all(self.root_dir.join(&rel))?;
                    let child = self.alloc(Node {
                        level: child_level,
                        range,
                        rel_path: rel,
                        state: NodeState::Unexpanded,
                    });
                    let insert_at = {
                        let siblings = self.children(cur);
                        siblings
                            .iter()
                            .position(|&c| self.nodes[c.0].range.start > range.start)
                            .unwrap_or(siblings.len())
                    };
                    if let NodeState::Inner(children) = &mut self.nodes[cur.0].state {
                        children.insert(insert_at, child);
                    }
                    debug!(name = %name, level = child_level, "created partition folder");
                    child
                }
            };
        }
    }

    /// The file covering `ts`, if any.
    pub fn file_at(&mut self, ts: Timestamp) -> Result<Option<FileRef>> {
        let Some(leaf) = self.get_leaf(ts, false)? else {
            return Ok(None);
        };
        Ok(self.container(leaf)?.owner(ts).cloned().map(|descriptor| FileRef {
            leaf,
            descriptor,
        }))
    }

    /// The nearest file entirely before (`backwards`) or after `ts`,
    /// searched across the whole tree.
    ///
    /// The search first narrows into the subtree covering `ts`, then widens
    /// through earlier/later sibling subtrees climbing up through the
    /// parents — the index is sparse, so the neighbor may live in a distant
    /// leaf.
    pub fn neighbor_file(&mut self, ts: Timestamp, backwards: bool) -> Result<Option<FileRef>> {
        self.scan_node(self.root, ts, backwards)
    }

    fn scan_node(&mut self, id: NodeId, ts: Timestamp, backwards: bool) -> Result<Option<FileRef>> {
        self.ensure_loaded(id, false)?;

        if self.nodes[id.0].level == 0 {
            let container = self.container(id)?;
            let found = if backwards {
                container.predecessor(ts)
            } else {
                container.successor(ts)
            };
            return Ok(found.cloned().map(|descriptor| FileRef {
                leaf: id,
                descriptor,
            }));
        }

        let children: Vec<NodeId> = self.children(id).to_vec();
        if backwards {
            for child in children.into_iter().rev() {
                // A subtree starting at or after ts cannot hold a file
                // ending strictly before it.
                if self.nodes[child.0].range.start >= ts {
                    continue;
                }
                if let Some(found) = self.scan_node(child, ts, backwards)? {
                    return Ok(Some(found));
                }
            }
        } else {
            for child in children {
                if self.nodes[child.0].range.end <= ts {
                    continue;
                }
                if let Some(found) = self.scan_node(child, ts, backwards)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    /// The predecessor, owner, and successor files surrounding `ts` across
    /// the entire tree.
    pub fn cut(&mut self, ts: Timestamp) -> Result<FileCut> {
        Ok(FileCut {
            predecessor: self.neighbor_file(ts, true)?,
            owner: self.file_at(ts)?,
            successor: self.neighbor_file(ts, false)?,
        })
    }

    /// Scans a subtree from its oldest (or newest) edge, leaf by leaf, for
    /// the first data file.
    pub fn edge_file(&mut self, id: NodeId, from_end: bool) -> Result<Option<FileRef>> {
        if from_end {
            self.scan_node(id, Timestamp::MAX, true)
        } else {
            self.scan_node(id, Timestamp::MIN, false)
        }
    }

    /// The oldest (or newest) file of the whole stream.
    pub fn first_file(&mut self, from_end: bool) -> Result<Option<FileRef>> {
        self.edge_file(self.root, from_end)
    }
}
