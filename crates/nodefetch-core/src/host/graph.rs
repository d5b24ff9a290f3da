//! In-memory module graph with invalidation timestamps.
//!
//! This is the host-side ledger the fetch cache polls: every invalidation
//! bumps a node's timestamp, and [`ModuleGraph::freshness_marker`] reports
//! it. Timestamps are strictly increasing across the whole graph so two
//! invalidations in the same millisecond are still distinguishable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// How a module was invalidated.
///
/// Both kinds bump the freshness marker the same way. Neither cascades to
/// importers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationKind {
    /// File content changed.
    Soft,
    /// The module must be re-evaluated from scratch (e.g. a config change).
    Hard,
}

/// A node in the module graph.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    /// The module URL (e.g., `/src/App.tsx`).
    pub url: String,
    /// The file path on disk.
    pub file: PathBuf,
    /// Last invalidation timestamp, 0 if never invalidated.
    pub last_invalidation_timestamp: u64,
    /// Kind of the last invalidation.
    pub last_invalidation: Option<InvalidationKind>,
}

impl ModuleNode {
    #[must_use]
    pub fn new(url: String, file: PathBuf) -> Self {
        Self {
            url,
            file,
            last_invalidation_timestamp: 0,
            last_invalidation: None,
        }
    }
}

/// Module graph keyed by file path.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// File path → `ModuleNode` mapping.
    modules: RwLock<HashMap<PathBuf, ModuleNode>>,
    /// Last timestamp handed out.
    clock: AtomicU64,
}

impl ModuleGraph {
    /// Create a new empty module graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. Returns `true` if it was not known before.
    pub fn ensure_module(&self, file: &Path, url: &str) -> bool {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        if modules.contains_key(file) {
            return false;
        }
        modules.insert(
            file.to_path_buf(),
            ModuleNode::new(url.to_string(), file.to_path_buf()),
        );
        true
    }

    #[must_use]
    pub fn get(&self, file: &Path) -> Option<ModuleNode> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file)
            .cloned()
    }

    /// Invalidate a module. Returns its new timestamp, or `None` if the
    /// module is unknown.
    pub fn invalidate_module(&self, file: &Path, kind: InvalidationKind) -> Option<u64> {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        let node = modules.get_mut(file)?;
        let timestamp = self.next_timestamp();
        node.last_invalidation_timestamp = timestamp;
        node.last_invalidation = Some(kind);
        debug!(file = %file.display(), timestamp, ?kind, "Invalidated module");
        Some(timestamp)
    }

    /// Invalidate every known module.
    pub fn invalidate_all(&self, kind: InvalidationKind) {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        let timestamp = self.next_timestamp();
        for node in modules.values_mut() {
            node.last_invalidation_timestamp = timestamp;
            node.last_invalidation = Some(kind);
        }
        debug!(count = modules.len(), timestamp, "Invalidated all modules");
    }

    /// Forget a module (e.g. its file was deleted).
    pub fn remove_module(&self, file: &Path) -> Option<ModuleNode> {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(file)
    }

    /// Freshness marker for `file`: its last invalidation timestamp, or
    /// `None` if the graph does not know it.
    #[must_use]
    pub fn freshness_marker(&self, file: &Path) -> Option<u64> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file)
            .map(|node| node.last_invalidation_timestamp)
    }

    /// All known module files, sorted.
    #[must_use]
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        files.sort();
        files
    }

    fn next_timestamp(&self) -> u64 {
        let now = now_ms();
        let previous = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
