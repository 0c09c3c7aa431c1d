use crate::error::Result;
use crate::vault::Vault;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// What a creation notification turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creation {
    /// Arrived before the startup snapshot; bulk loading, not a user action.
    BeforeReady,
    /// Path was already known (sync or external tooling put it there).
    AlreadyKnown,
    /// A genuinely new document.
    Novel,
}

impl Creation {
    pub fn is_novel(self) -> bool {
        self == Creation::Novel
    }
}

#[derive(Default)]
struct TrackerState {
    ready: bool,
    known: HashSet<String>,
}

/// The set of documents considered pre-existing.
///
/// Starts uninitialized; [`CreationTracker::snapshot`] takes the one-time
/// listing from the injected vault and flips it to ready. Until then every
/// notification is ignored.
pub struct CreationTracker {
    source: Arc<dyn Vault>,
    state: RwLock<TrackerState>,
}

impl CreationTracker {
    pub fn new(source: Arc<dyn Vault>) -> Self {
        Self {
            source,
            state: RwLock::new(TrackerState::default()),
        }
    }

    /// Take the startup snapshot. Returns how many documents are known.
    /// Calling it again after ready is a no-op.
    pub async fn snapshot(&self) -> Result<usize> {
        if self.is_ready() {
            return Ok(self.len());
        }
        let paths = self.source.list_all_documents().await?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if !state.ready {
            state.known.extend(paths);
            state.ready = true;
            tracing::info!("Creation tracker ready with {} known documents", state.known.len());
        }
        Ok(state.known.len())
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().unwrap_or_else(|e| e.into_inner()).ready
    }

    pub fn is_known(&self, path: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .known
            .contains(path)
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(|e| e.into_inner()).known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn on_created(&self, path: &str) -> Creation {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if !state.ready {
            return Creation::BeforeReady;
        }
        if state.known.insert(path.to_string()) {
            Creation::Novel
        } else {
            Creation::AlreadyKnown
        }
    }

    pub fn on_deleted(&self, path: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.ready {
            state.known.remove(path);
        }
    }

    /// Renames never count as creations; the destination just becomes known.
    pub fn on_renamed(&self, from: Option<&str>, to: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if !state.ready {
            return;
        }
        if let Some(from) = from {
            state.known.remove(from);
        }
        state.known.insert(to.to_string());
    }
}
