//! Module fetching.
//!
//! [`ModuleFetcher`] ties the pieces together: normalize the id, resolve it
//! to a file, decide whether it is externalized, then serve it from the
//! per-mode cache or run the host transform.
//!
//! ## Freshness
//!
//! Every lookup reads the host's freshness marker for the resolved path. An
//! entry is served only if the marker is no newer than the one captured
//! right before its transform started. A change raced with a transform
//! therefore leaves the stored entry stale, and it is rebuilt on the next
//! request.

mod cache;
mod resolve;

pub use cache::LedgerEntry;

use crate::config::FetchOptions;
use crate::error::FetchError;
use crate::externalize::should_externalize;
use crate::host::{ModuleHost, PipelineOutput, ResolvedId};
use crate::ids::{is_data_url, is_in_node_modules, is_node_builtin, normalize_module_id, to_file_path};
use crate::mode::ExecutionMode;
use crate::source_map::{extract_source_map, normalize_sources, with_inline_source_map, SourceMap};
use cache::{CacheEntry, Checkout, SharedFetch, TransformCache};
use futures::FutureExt;
use nodefetch_util::path::{slash, strip_query};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of fetching a module.
///
/// Either `code` is set (the module went through the transform pipeline) or
/// `externalize` is (the runtime should import that specifier natively).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    /// Transformed code.
    pub code: Option<String>,
    /// Source map with sources relative to the module's directory.
    pub map: Option<SourceMap>,
    /// Resolved file path, including any query string.
    pub resolved_path: PathBuf,
    /// Specifier to import natively.
    pub externalize: Option<String>,
}

impl FetchResult {
    fn externalized(resolved_path: PathBuf, target: String) -> Self {
        Self {
            code: None,
            map: None,
            resolved_path,
            externalize: Some(target),
        }
    }

    #[must_use]
    pub fn is_externalized(&self) -> bool {
        self.externalize.is_some()
    }
}

struct Inner {
    options: FetchOptions,
    host: Arc<dyn ModuleHost>,
    cache: TransformCache,
}

/// Fetches modules for server and client execution with per-mode caching.
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct ModuleFetcher {
    inner: Arc<Inner>,
}

impl ModuleFetcher {
    pub fn new(host: Arc<dyn ModuleHost>, options: FetchOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                host,
                cache: TransformCache::new(),
            }),
        }
    }

    /// Fetch `id` for `mode`.
    ///
    /// When `mode` is `None` it is derived from the id, see
    /// [`Self::transform_mode`]. Concurrent requests for the same module and
    /// mode share one transform.
    pub async fn fetch_module(
        &self,
        id: &str,
        mode: Option<ExecutionMode>,
    ) -> Result<FetchResult, FetchError> {
        if is_data_url(id) {
            return Ok(FetchResult::externalized(PathBuf::from(id), id.to_string()));
        }
        let id = normalize_module_id(id);
        if is_node_builtin(&id) {
            return Ok(FetchResult::externalized(PathBuf::from(&id), id));
        }
        let mode = mode.unwrap_or_else(|| self.transform_mode(&id));
        let root = &self.inner.options.root;

        let resolved = resolve::resolve_id(
            self.inner.host.as_ref(),
            &self.inner.options,
            &id,
            None,
            Some(mode),
        )
        .await?;
        let path = match resolved {
            Some(ResolvedId { id: target, external: true }) => {
                debug!(id, target = %target, "Host marked module external");
                return Ok(FetchResult::externalized(PathBuf::from(&target), target));
            }
            Some(ResolvedId { id: resolved, .. }) => {
                to_file_path(&normalize_module_id(&resolved), root).0
            }
            None => to_file_path(&id, root).0,
        };

        let path_id = slash(&path.to_string_lossy());
        if let Some(target) = should_externalize(&path_id, &self.inner.options).await {
            return Ok(FetchResult::externalized(path, target));
        }

        let current = self.inner.host.freshness_marker(&path);
        let checkout = self.inner.cache.checkout(&path, mode, current, |generation| {
            self.spawn_transform(id.clone(), path.clone(), mode, generation)
        });
        match checkout {
            Checkout::Hit(result) => Ok(FetchResult::clone(&result)),
            Checkout::Wait(task) => task.await,
        }
    }

    /// Run the transform on its own task so it finishes even if every
    /// caller stops waiting.
    fn spawn_transform(
        &self,
        id: String,
        path: PathBuf,
        mode: ExecutionMode,
        generation: u64,
    ) -> SharedFetch {
        let mut guard = PendingGuard {
            inner: Arc::clone(&self.inner),
            path: path.clone(),
            mode,
            generation,
            armed: true,
        };
        let handle = tokio::spawn(async move {
            let outcome = guard
                .inner
                .run_transform(&id, &guard.path, guard.mode, guard.generation)
                .await;
            guard.armed = false;
            outcome
        });

        async move {
            handle.await.unwrap_or_else(|join_error| {
                warn!(path = %path.display(), %mode, error = %join_error, "Transform task failed");
                Err(FetchError::TaskFailed {
                    path,
                    message: join_error.to_string(),
                })
            })
        }
        .boxed()
        .shared()
    }

    /// Resolve `specifier` as imported from `importer`.
    ///
    /// The importer is made absolute against the root first. Without an
    /// explicit mode the importer's transform mode is used, falling back to
    /// server.
    pub async fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
        mode: Option<ExecutionMode>,
    ) -> Result<Option<ResolvedId>, FetchError> {
        resolve::resolve_id(
            self.inner.host.as_ref(),
            &self.inner.options,
            specifier,
            importer,
            mode,
        )
        .await
    }

    /// See [`crate::externalize::should_externalize`].
    pub async fn should_externalize(&self, id: &str) -> Option<String> {
        should_externalize(id, &self.inner.options).await
    }

    /// Mode a request for `id` runs in when the caller does not say.
    #[must_use]
    pub fn transform_mode(&self, id: &str) -> ExecutionMode {
        self.inner.options.transform_mode.mode_for(id)
    }

    /// Paths holding a fresh entry for `mode`, sorted.
    #[must_use]
    pub fn cached_paths(&self, mode: ExecutionMode) -> Vec<PathBuf> {
        self.inner
            .cache
            .entries(mode)
            .into_iter()
            .filter(|(path, captured)| self.is_fresh(path, *captured))
            .map(|(path, _)| path)
            .collect()
    }

    /// Whether `path` holds a fresh entry for `mode`.
    #[must_use]
    pub fn is_cached(&self, path: &Path, mode: ExecutionMode) -> bool {
        self.inner
            .cache
            .captured(path, mode)
            .is_some_and(|captured| self.is_fresh(path, captured))
    }

    /// Whether `path` has been transformed in any mode since the last
    /// [`Self::clear_cache`].
    #[must_use]
    pub fn is_fetched(&self, path: &Path) -> bool {
        self.inner.cache.ledger(path).is_some()
    }

    #[must_use]
    pub fn ledger_entry(&self, path: &Path) -> Option<LedgerEntry> {
        self.inner.cache.ledger(path)
    }

    /// Time spent in transforms whose results are currently stored.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.inner.cache.total_duration()
    }

    /// Drop every cached entry in both modes and the ledger.
    ///
    /// Transforms already running still deliver to their callers but do not
    /// store their result.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    fn is_fresh(&self, path: &Path, captured: u64) -> bool {
        self.inner
            .host
            .freshness_marker(path)
            .is_some_and(|marker| marker <= captured)
    }
}

/// Frees a pending slot when its transform task is torn down before
/// finishing (a panic, or runtime shutdown), so the next request starts a
/// new transform instead of joining the dead one.
struct PendingGuard {
    inner: Arc<Inner>,
    path: PathBuf,
    mode: ExecutionMode,
    generation: u64,
    armed: bool,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.armed {
            debug!(path = %self.path.display(), mode = %self.mode, "Dropping unfinished transform");
            self.inner.cache.abandon(&self.path, self.mode, self.generation);
        }
    }
}

impl Inner {
    async fn run_transform(
        &self,
        id: &str,
        path: &Path,
        mode: ExecutionMode,
        generation: u64,
    ) -> Result<FetchResult, FetchError> {
        // Read before transforming: a change landing mid-transform must leave
        // the stored entry stale.
        let captured_timestamp = self.host.freshness_marker(path).unwrap_or(0);
        let started = Instant::now();

        match self.transform(id, path, mode).await {
            Ok(result) => {
                let known = self.host.freshness_marker(path).is_some();
                let result = Arc::new(result);
                self.cache.complete(
                    path,
                    mode,
                    generation,
                    known,
                    CacheEntry {
                        result: Arc::clone(&result),
                        captured_timestamp,
                        duration: started.elapsed(),
                    },
                );
                Ok(FetchResult::clone(&result))
            }
            Err(e) => {
                debug!(path = %path.display(), %mode, error = %e, "Transform failed");
                self.cache.abandon(path, mode, generation);
                Err(e)
            }
        }
    }

    async fn transform(
        &self,
        id: &str,
        path: &Path,
        mode: ExecutionMode,
    ) -> Result<FetchResult, FetchError> {
        let output = self
            .host
            .transform(id, path, mode)
            .await
            .map_err(|source| FetchError::Transform {
                path: path.to_path_buf(),
                mode,
                source,
            })?
            .ok_or_else(|| FetchError::NotTransformed {
                path: path.to_path_buf(),
                mode,
            })?;

        let PipelineOutput { code, map } = output;
        let path_str = slash(&path.to_string_lossy());
        let file = PathBuf::from(strip_query(&path_str));

        let mut map = map.or_else(|| extract_source_map(&code));
        if let Some(map) = map.as_mut() {
            normalize_sources(map, &file, &self.options.root);
        }

        let code = match &map {
            Some(map) if self.options.sourcemap && !is_in_node_modules(&path_str) => {
                with_inline_source_map(&code, map)
            }
            _ => code,
        };

        Ok(FetchResult {
            code: Some(code),
            map,
            resolved_path: path.to_path_buf(),
            externalize: None,
        })
    }
}
