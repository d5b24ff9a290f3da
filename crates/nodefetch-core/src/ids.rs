//! Module id normalization.
//!
//! The same file can be requested as `/src/a.ts`, `/@fs/abs/src/a.ts` or
//! `file:///abs/src/a.ts`. These helpers reduce ids to a canonical spelling
//! and map them onto filesystem paths so every spelling shares a cache slot.

use nodefetch_util::path::{normalize, slash, strip_query, with_trailing_slash};
use std::path::{Path, PathBuf};

/// Node builtin modules, without the `node:` prefix.
const NODE_BUILTINS: &[&str] = &[
    "assert", "assert/strict", "async_hooks", "buffer", "child_process", "cluster", "console",
    "constants", "crypto", "dgram", "diagnostics_channel", "dns", "dns/promises", "domain",
    "events", "fs", "fs/promises", "http", "http2", "https", "inspector", "inspector/promises",
    "module", "net", "os", "path", "path/posix", "path/win32", "perf_hooks", "process",
    "punycode", "querystring", "readline", "readline/promises", "repl", "stream",
    "stream/consumers", "stream/promises", "stream/web", "string_decoder", "sys", "timers",
    "timers/promises", "tls", "trace_events", "tty", "url", "util", "util/types", "v8", "vm",
    "wasi", "worker_threads", "zlib",
];

/// Builtins that only exist with the `node:` prefix.
const PREFIXED_ONLY_BUILTINS: &[&str] = &["node:sea", "node:sqlite", "node:test", "node:test/reporters"];

/// Whether `id` names a Node builtin (`fs`, `node:fs`, `node:test`).
#[must_use]
pub fn is_node_builtin(id: &str) -> bool {
    if PREFIXED_ONLY_BUILTINS.contains(&id) {
        return true;
    }
    let bare = id.strip_prefix("node:").unwrap_or(id);
    NODE_BUILTINS.contains(&bare)
}

/// Whether `id` is an inline `data:` URL.
#[must_use]
pub fn is_data_url(id: &str) -> bool {
    id.starts_with("data:")
}

/// Reduce a module id to its canonical spelling.
///
/// - `\` becomes `/`
/// - `/@fs/` and `file://` prefixes are dropped
/// - `node:` is dropped unless the builtin only exists prefixed
/// - a NUL byte becomes `__x00__` (virtual module convention)
/// - repeated leading slashes collapse into one
#[must_use]
pub fn normalize_module_id(id: &str) -> String {
    if PREFIXED_ONLY_BUILTINS.contains(&id) {
        return id.to_string();
    }

    let mut out = slash(id).replace('\0', "__x00__");

    if let Some(rest) = out.strip_prefix("/@fs/") {
        out = if cfg!(windows) {
            rest.to_string()
        } else {
            format!("/{rest}")
        };
    }
    if let Some(rest) = out.strip_prefix("file://") {
        out = rest.to_string();
    }
    if let Some(rest) = out.strip_prefix("node:") {
        out = rest.to_string();
    }
    if out.starts_with("//") {
        let trimmed = out.trim_start_matches('/');
        out = format!("/{trimmed}");
    }
    out
}

/// Map a normalized id onto a filesystem path.
///
/// Root-relative ids (`/src/a.ts`) are joined onto `root` when the file
/// exists there; ids already under `root` are used as-is. Anything else is
/// returned verbatim. The query string is kept so `a.css` and
/// `a.css?inline` stay distinct; existence is checked without it.
///
/// Returns the path and whether it exists.
#[must_use]
pub fn to_file_path(id: &str, root: &Path) -> (PathBuf, bool) {
    let root_prefix = with_trailing_slash(&slash(&root.to_string_lossy()));

    if id.starts_with('/') && !id.starts_with(&root_prefix) {
        let candidate = root.join(&id[1..]);
        let on_disk = root.join(strip_query(&id[1..]));
        if on_disk.exists() {
            return (normalize(&candidate), true);
        }
    } else if id.starts_with(&root_prefix) && Path::new(strip_query(id)).exists() {
        return (PathBuf::from(id), true);
    }

    (PathBuf::from(id), false)
}

/// Whether a path lives inside a `node_modules` directory.
#[must_use]
pub fn is_in_node_modules(path: &str) -> bool {
    slash(path).contains("/node_modules/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builtins() {
        assert!(is_node_builtin("fs"));
        assert!(is_node_builtin("node:fs/promises"));
        assert!(is_node_builtin("node:test"));
        assert!(!is_node_builtin("test"));
        assert!(!is_node_builtin("lodash"));
    }

    #[test]
    fn test_normalize_module_id() {
        assert_eq!(normalize_module_id("/@fs/home/u/a.ts"), "/home/u/a.ts");
        assert_eq!(normalize_module_id("file:///home/u/a.ts"), "/home/u/a.ts");
        assert_eq!(normalize_module_id("node:path"), "path");
        assert_eq!(normalize_module_id("node:test"), "node:test");
        assert_eq!(normalize_module_id("\0virtual:env"), "__x00__virtual:env");
        assert_eq!(normalize_module_id("///src/a.ts"), "/src/a.ts");
        assert_eq!(normalize_module_id(r"C:\proj\a.ts"), "C:/proj/a.ts");
    }

    #[test]
    fn test_to_file_path_root_relative() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/foo.js"), "export {}").unwrap();

        let (path, exists) = to_file_path("/src/foo.js", dir.path());
        assert!(exists);
        assert_eq!(path, dir.path().join("src/foo.js"));

        let (path, exists) = to_file_path("/src/foo.js?raw", dir.path());
        assert!(exists);
        assert_eq!(path, dir.path().join("src/foo.js?raw"));

        let (path, exists) = to_file_path("/src/missing.js", dir.path());
        assert!(!exists);
        assert_eq!(path, PathBuf::from("/src/missing.js"));
    }

    #[test]
    fn test_is_in_node_modules() {
        assert!(is_in_node_modules("/p/node_modules/react/index.js"));
        assert!(!is_in_node_modules("/p/src/node_modules.js"));
    }
}
