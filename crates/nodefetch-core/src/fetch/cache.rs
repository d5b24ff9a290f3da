//! Per-mode transform cache.
//!
//! Each mode has its own slot map keyed by resolved path. A slot is either a
//! transform in flight or a finished entry. Freshness is checked on every
//! lookup against the marker the host reports, so nothing here subscribes to
//! host events.

use super::FetchResult;
use crate::error::FetchError;
use crate::mode::ExecutionMode;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// A transform in flight, awaitable by any number of callers.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<FetchResult, FetchError>>>;

/// A finished transform result.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub result: Arc<FetchResult>,
    /// Host marker read before the transform started.
    pub captured_timestamp: u64,
    pub duration: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, current: Option<u64>) -> bool {
        current.is_some_and(|marker| marker <= self.captured_timestamp)
    }
}

enum Slot {
    Pending { generation: u64, task: SharedFetch },
    Ready(CacheEntry),
}

/// What the cache knows about a path across both modes.
///
/// Only answers "has this path been fetched". Never used to reuse a result
/// across modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Modes that stored an entry for this path, sorted.
    pub modes: Vec<ExecutionMode>,
    /// Marker captured by the most recent stored transform.
    pub captured_timestamp: u64,
    /// Duration of the most recent stored transform.
    pub duration: Duration,
}

/// Outcome of [`TransformCache::checkout`].
pub(crate) enum Checkout {
    /// A fresh entry.
    Hit(Arc<FetchResult>),
    /// A transform in flight, possibly started by this call.
    Wait(SharedFetch),
}

#[derive(Default)]
struct State {
    server: HashMap<PathBuf, Slot>,
    client: HashMap<PathBuf, Slot>,
    ledger: HashMap<PathBuf, LedgerEntry>,
    /// Bumped by `clear`. Transforms started before a clear do not store.
    generation: u64,
}

impl State {
    fn slots(&self, mode: ExecutionMode) -> &HashMap<PathBuf, Slot> {
        match mode {
            ExecutionMode::Server => &self.server,
            ExecutionMode::Client => &self.client,
        }
    }

    fn slots_mut(&mut self, mode: ExecutionMode) -> &mut HashMap<PathBuf, Slot> {
        match mode {
            ExecutionMode::Server => &mut self.server,
            ExecutionMode::Client => &mut self.client,
        }
    }

    fn forget_mode(&mut self, path: &Path, mode: ExecutionMode) {
        if let Some(entry) = self.ledger.get_mut(path) {
            entry.modes.retain(|m| *m != mode);
        }
    }
}

/// Cache of transform results, one namespace per [`ExecutionMode`].
#[derive(Default)]
pub(crate) struct TransformCache {
    state: Mutex<State>,
}

impl TransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up `(path, mode)` given the host's current marker.
    ///
    /// A fresh entry is a hit. A stale entry is discarded. If nothing usable
    /// is left and no transform is in flight, `start` is called with the
    /// current generation and its future is installed as the pending slot.
    /// All of this happens under one lock, so concurrent callers share one
    /// transform.
    pub fn checkout(
        &self,
        path: &Path,
        mode: ExecutionMode,
        current: Option<u64>,
        start: impl FnOnce(u64) -> SharedFetch,
    ) -> Checkout {
        let mut state = self.lock();
        let generation = state.generation;

        match state.slots(mode).get(path) {
            Some(Slot::Pending { task, .. }) => {
                debug!(path = %path.display(), %mode, "Joining in-flight transform");
                return Checkout::Wait(task.clone());
            }
            Some(Slot::Ready(entry)) if entry.is_fresh(current) => {
                debug!(path = %path.display(), %mode, "Cache hit");
                return Checkout::Hit(entry.result.clone());
            }
            Some(Slot::Ready(entry)) => {
                debug!(
                    path = %path.display(),
                    %mode,
                    captured = entry.captured_timestamp,
                    ?current,
                    "Discarding stale entry"
                );
                state.slots_mut(mode).remove(path);
                state.forget_mode(path, mode);
            }
            None => {}
        }

        let task = start(generation);
        state.slots_mut(mode).insert(
            path.to_path_buf(),
            Slot::Pending {
                generation,
                task: task.clone(),
            },
        );
        Checkout::Wait(task)
    }

    /// Store a finished transform started at `generation`.
    ///
    /// Nothing is stored if the cache was cleared since, or if the host does
    /// not know the path (`known == false`). In both cases the pending slot,
    /// if still ours, is removed.
    pub fn complete(
        &self,
        path: &Path,
        mode: ExecutionMode,
        generation: u64,
        known: bool,
        entry: CacheEntry,
    ) {
        let mut state = self.lock();
        if !owns_slot(&state, path, mode, generation) {
            debug!(path = %path.display(), %mode, "Cache cleared during transform, not storing");
            return;
        }
        if !known {
            debug!(path = %path.display(), %mode, "Host does not track module, not storing");
            state.slots_mut(mode).remove(path);
            return;
        }

        let (captured_timestamp, duration) = (entry.captured_timestamp, entry.duration);
        state
            .slots_mut(mode)
            .insert(path.to_path_buf(), Slot::Ready(entry));

        let ledger = state
            .ledger
            .entry(path.to_path_buf())
            .or_insert_with(|| LedgerEntry {
                modes: Vec::new(),
                captured_timestamp,
                duration,
            });
        if !ledger.modes.contains(&mode) {
            ledger.modes.push(mode);
            ledger.modes.sort();
        }
        ledger.captured_timestamp = captured_timestamp;
        ledger.duration = duration;

        debug!(
            path = %path.display(),
            %mode,
            captured = captured_timestamp,
            duration_ms = duration.as_millis() as u64,
            "Stored transform"
        );
    }

    /// Drop the pending slot of a failed transform started at `generation`.
    pub fn abandon(&self, path: &Path, mode: ExecutionMode, generation: u64) {
        let mut state = self.lock();
        if owns_slot(&state, path, mode, generation) {
            state.slots_mut(mode).remove(path);
        }
    }

    /// Paths holding a finished entry for `mode`, with their captured
    /// markers, sorted by path.
    pub fn entries(&self, mode: ExecutionMode) -> Vec<(PathBuf, u64)> {
        let state = self.lock();
        let mut entries: Vec<(PathBuf, u64)> = state
            .slots(mode)
            .iter()
            .filter_map(|(path, slot)| match slot {
                Slot::Ready(entry) => Some((path.clone(), entry.captured_timestamp)),
                Slot::Pending { .. } => None,
            })
            .collect();
        entries.sort();
        entries
    }

    /// Captured marker of the finished entry for `(path, mode)`.
    pub fn captured(&self, path: &Path, mode: ExecutionMode) -> Option<u64> {
        match self.lock().slots(mode).get(path) {
            Some(Slot::Ready(entry)) => Some(entry.captured_timestamp),
            _ => None,
        }
    }

    pub fn ledger(&self, path: &Path) -> Option<LedgerEntry> {
        self.lock().ledger.get(path).cloned()
    }

    /// Sum of transform durations over every stored entry.
    pub fn total_duration(&self) -> Duration {
        let state = self.lock();
        state
            .server
            .values()
            .chain(state.client.values())
            .filter_map(|slot| match slot {
                Slot::Ready(entry) => Some(entry.duration),
                Slot::Pending { .. } => None,
            })
            .sum()
    }

    /// Drop every entry, pending slot and the ledger.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.server.clear();
        state.client.clear();
        state.ledger.clear();
        state.generation += 1;
        debug!(generation = state.generation, "Cleared transform cache");
    }
}

fn owns_slot(state: &State, path: &Path, mode: ExecutionMode, generation: u64) -> bool {
    state.generation == generation
        && matches!(
            state.slots(mode).get(path),
            Some(Slot::Pending { generation: g, .. }) if *g == generation
        )
}
