//! Explicit registry of live reader and writer sessions.
//!
//! The store holds an entry per active session, keyed by a stable id;
//! dropping the session handle removes the entry. The lock is a short-held
//! reader/writer lock around table scans only — it never wraps file I/O.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, StoreError};

/// Stable identifier of one live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

/// What a session does to its streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Reads one or more streams.
    Reader,
    /// Writes exactly one stream.
    Writer,
}

#[derive(Debug)]
struct SessionInfo {
    kind: SessionKind,
    stream_keys: Vec<String>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    sessions: HashMap<SessionId, SessionInfo>,
}

/// Tracks live sessions per store instance.
#[derive(Debug, Default, Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a writer session.
    ///
    /// At most one writer may target a logical stream at a time; a second
    /// registration fails with a validation error.
    pub fn register_writer(&self, stream_key: &str) -> Result<SessionHandle> {
        let mut inner = self.inner.write();
        let taken = inner.sessions.values().any(|info| {
            info.kind == SessionKind::Writer && info.stream_keys.iter().any(|k| k == stream_key)
        });
        if taken {
            return Err(StoreError::Validation(format!(
                "stream '{}' already has an active writer",
                stream_key
            )));
        }
        Ok(self.insert(
            &mut inner,
            SessionKind::Writer,
            vec![stream_key.to_string()],
        ))
    }

    /// Registers a reader session over a set of streams.
    pub fn register_reader(&self, stream_keys: &[String]) -> SessionHandle {
        let mut inner = self.inner.write();
        self.insert(&mut inner, SessionKind::Reader, stream_keys.to_vec())
    }

    fn insert(
        &self,
        inner: &mut RegistryInner,
        kind: SessionKind,
        stream_keys: Vec<String>,
    ) -> SessionHandle {
        let id = SessionId(inner.next_id);
        inner.next_id += 1;
        inner.sessions.insert(id, SessionInfo { kind, stream_keys });
        SessionHandle {
            id,
            registry: Arc::clone(&self.inner),
        }
    }

    /// True when any session is active against `stream_key` or one of its
    /// descendants. Used to refuse structural mutations of live folders.
    pub fn any_active_under(&self, stream_key: &str) -> bool {
        let prefix = format!("{}/", stream_key);
        let inner = self.inner.read();
        inner.sessions.values().any(|info| {
            info.stream_keys
                .iter()
                .any(|k| k == stream_key || k.starts_with(&prefix))
        })
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        self.inner.read().sessions.len()
    }
}

/// Removes its registry entry on drop.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    registry: Arc<RwLock<RegistryInner>>,
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.registry.write().sessions.remove(&self.id);
    }
}
