//! `nodefetch watch` command implementation.
//!
//! Fetches a module, then watches the project root. Changed files are
//! invalidated in the host graph, deleted files are dropped from it, and the
//! module is fetched again; the cache decides on its own which transforms
//! have to run.

use miette::{IntoDiagnostic, Result};
use nodefetch_core::host::InvalidationKind;
use nodefetch_core::paths::CONFIG_FILES;
use nodefetch_core::{ExecutionMode, FetchError, FetchResult, FsHost, ModuleFetcher, ModuleGraph};
use nodefetch_util::path::strip_query;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Quiet period before a batch of file events is reported.
const DEBOUNCE: Duration = Duration::from_millis(50);

/// A debounced batch of file system events.
#[derive(Debug, Default)]
struct FileChanges {
    changed: Vec<PathBuf>,
    removed: Vec<PathBuf>,
}

/// One fetch report for JSON output (one line per fetch).
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WatchEvent<'a> {
    ok: bool,
    id: &'a str,
    mode: ExecutionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved_path: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    externalize: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    elapsed_ms: u64,
}

/// Run the watch command.
pub fn run(
    cwd: &Path,
    id: &str,
    mode: Option<ExecutionMode>,
    config: Option<&Path>,
    json: bool,
) -> Result<()> {
    let options = super::load_options(cwd, config)?;
    let id = super::module_id(cwd, id);
    let root = options.root.clone();

    let host = Arc::new(FsHost::new(root.clone()));
    let graph = Arc::clone(host.graph());
    let fetcher = ModuleFetcher::new(host, options);
    let mode = mode.unwrap_or_else(|| fetcher.transform_mode(&id));

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    runtime.block_on(async move {
        fetch_and_report(&fetcher, &id, mode, json).await;

        let (file_change_tx, mut file_change_rx) = mpsc::channel::<FileChanges>(16);
        let watch_root = root.clone();
        std::thread::spawn(move || {
            if let Err(e) = watch_files(&watch_root, file_change_tx) {
                error!(error = %e, "File watcher stopped");
            }
        });
        info!(root = %root.display(), %mode, id, "Watching for changes");

        loop {
            tokio::select! {
                changes = file_change_rx.recv() => {
                    let Some(changes) = changes else { break };
                    if invalidate(&graph, &changes) > 0 {
                        fetch_and_report(&fetcher, &id, mode, json).await;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Stopping watch");
                    break;
                }
            }
        }
    });
    Ok(())
}

async fn fetch_and_report(fetcher: &ModuleFetcher, id: &str, mode: ExecutionMode, json: bool) {
    let started = Instant::now();
    let outcome = fetcher.fetch_module(id, Some(mode)).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if json {
        let event = watch_event(id, mode, &outcome, elapsed_ms);
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Failed to serialize watch event"),
        }
        return;
    }

    match outcome {
        Ok(result) => match (&result.externalize, &result.code) {
            (Some(target), _) => println!("[{mode}] {id} -> externalize {target}"),
            (None, Some(code)) => {
                println!("[{mode}] {id} ({} bytes, {elapsed_ms} ms)", code.len());
            }
            (None, None) => println!("[{mode}] {id} (empty)"),
        },
        Err(e) => eprintln!("[{mode}] {id}: {e}"),
    }
}

fn watch_event<'a>(
    id: &'a str,
    mode: ExecutionMode,
    outcome: &'a Result<FetchResult, FetchError>,
    elapsed_ms: u64,
) -> WatchEvent<'a> {
    match outcome {
        Ok(result) => WatchEvent {
            ok: true,
            id,
            mode,
            resolved_path: Some(&result.resolved_path),
            externalize: result.externalize.as_deref(),
            bytes: result.code.as_ref().map(String::len),
            error: None,
            elapsed_ms,
        },
        Err(e) => WatchEvent {
            ok: false,
            id,
            mode,
            resolved_path: None,
            externalize: None,
            bytes: None,
            error: Some(e.to_string()),
            elapsed_ms,
        },
    }
}

/// Apply a batch to the graph: modules backed by a changed file are
/// invalidated, modules backed by a removed file are forgotten.
///
/// A changed config file invalidates the whole graph. Returns the number of
/// modules touched.
fn invalidate(graph: &ModuleGraph, changes: &FileChanges) -> usize {
    if changes
        .changed
        .iter()
        .chain(&changes.removed)
        .any(|p| is_config_file(p))
    {
        let count = graph.files().len();
        graph.invalidate_all(InvalidationKind::Hard);
        return count;
    }

    let changed: HashSet<&Path> = changes.changed.iter().map(PathBuf::as_path).collect();
    let removed: HashSet<&Path> = changes.removed.iter().map(PathBuf::as_path).collect();
    let mut count = 0;
    for file in graph.files() {
        let on_disk = PathBuf::from(strip_query(&file.to_string_lossy()));
        if removed.contains(on_disk.as_path()) {
            if graph.remove_module(&file).is_some() {
                count += 1;
            }
            info!(file = %on_disk.display(), "File removed");
        } else if changed.contains(on_disk.as_path()) {
            if graph.invalidate_module(&file, InvalidationKind::Soft).is_some() {
                count += 1;
            }
            info!(file = %on_disk.display(), "File changed");
        }
    }
    debug!(
        changed = changed.len(),
        removed = removed.len(),
        touched = count,
        "Processed file changes"
    );
    count
}

fn is_config_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| CONFIG_FILES.contains(&name))
}

fn should_ignore(path: &Path) -> bool {
    let path_str = path.to_string_lossy();

    if path_str.contains("/node_modules/")
        || path_str.contains("/target/")
        || path_str.contains("/.git/")
        || path_str.contains("/dist/")
        || path_str.contains("/build/")
    {
        return true;
    }

    // Dotfiles, except our own config.
    path.file_name()
        .map(|name| name.to_string_lossy())
        .is_some_and(|name| name.starts_with('.') && !is_config_file(path))
}

fn is_relevant(path: &Path) -> bool {
    if should_ignore(path) {
        return false;
    }
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    matches!(
        ext,
        "ts" | "tsx" | "mts" | "cts" | "js" | "jsx" | "mjs" | "cjs" | "css" | "json"
    )
}

/// Watch `root` and send debounced batches of changed files.
fn watch_files(root: &Path, file_change_tx: mpsc::Sender<FileChanges>) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();

    let mut watcher = RecommendedWatcher::new(tx, Config::default()).into_diagnostic()?;
    watcher.watch(root, RecursiveMode::Recursive).into_diagnostic()?;

    let mut changed: HashSet<PathBuf> = HashSet::new();
    let mut removed: HashSet<PathBuf> = HashSet::new();

    loop {
        match rx.recv_timeout(DEBOUNCE) {
            Ok(Ok(event)) => {
                let is_remove = matches!(event.kind, EventKind::Remove(_));
                for path in event.paths.into_iter().filter(|p| is_relevant(p)) {
                    // The last event for a path within a batch wins.
                    if is_remove {
                        changed.remove(&path);
                        removed.insert(path);
                    } else {
                        removed.remove(&path);
                        changed.insert(path);
                    }
                }
            }
            Ok(Err(e)) => warn!(error = %e, "Watch error"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                if changed.is_empty() && removed.is_empty() {
                    continue;
                }
                let batch = FileChanges {
                    changed: changed.drain().collect(),
                    removed: removed.drain().collect(),
                };
                if file_change_tx.blocking_send(batch).is_err() {
                    break;
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}
