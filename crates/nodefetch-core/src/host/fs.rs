//! A filesystem-backed host.
//!
//! Resolves specifiers against the project root and `node_modules`, loads
//! files from disk, runs registered transform hooks and records every
//! transformed module in a [`ModuleGraph`]. It does not transpile on its own:
//! TypeScript or JSX support comes from hooks.

use super::{HostError, HostResult, ModuleGraph, ModuleHost, PipelineOutput, ResolvedId};
use crate::ids::normalize_module_id;
use crate::mode::ExecutionMode;
use crate::source_map::SourceMap;
use async_trait::async_trait;
use nodefetch_util::path::{normalize, slash};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// Extensions probed when a specifier omits one.
const EXTENSIONS: &[&str] = &[".ts", ".tsx", ".mts", ".js", ".jsx", ".mjs", ".cjs", ".json"];

/// A transform hook: `(code, id, mode) -> replacement code`.
///
/// Returning `Ok(None)` leaves the code untouched.
pub type TransformHook =
    Arc<dyn Fn(&str, &str, ExecutionMode) -> HostResult<Option<String>> + Send + Sync>;

/// Filesystem host.
pub struct FsHost {
    /// Project root.
    root: PathBuf,
    /// Graph every transformed module is registered in.
    graph: Arc<ModuleGraph>,
    /// Transform hooks, run in registration order.
    hooks: Vec<(String, TransformHook)>,
}

impl FsHost {
    /// Create a host with a fresh module graph.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self::with_graph(root, Arc::new(ModuleGraph::new()))
    }

    /// Create a host sharing an existing module graph.
    #[must_use]
    pub fn with_graph(root: PathBuf, graph: Arc<ModuleGraph>) -> Self {
        Self {
            root,
            graph,
            hooks: Vec::new(),
        }
    }

    /// Register a transform hook.
    #[must_use]
    pub fn with_hook(mut self, name: impl Into<String>, hook: TransformHook) -> Self {
        self.hooks.push((name.into(), hook));
        self
    }

    #[must_use]
    pub fn graph(&self) -> &Arc<ModuleGraph> {
        &self.graph
    }

    /// Resolve a specifier (without query) to a file on disk.
    fn resolve_path(
        &self,
        specifier: &str,
        importer: Option<&str>,
        mode: ExecutionMode,
    ) -> Option<PathBuf> {
        let importer_dir = importer
            .map(|i| PathBuf::from(normalize_module_id(i)))
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| self.root.clone());

        if specifier.starts_with("./") || specifier.starts_with("../") {
            return probe(&importer_dir.join(specifier), mode);
        }

        if specifier.starts_with('/') || Path::new(specifier).is_absolute() {
            let as_is = Path::new(specifier);
            if as_is.starts_with(&self.root) {
                return probe(as_is, mode);
            }
            return probe(&self.root.join(specifier.trim_start_matches('/')), mode)
                .or_else(|| probe(as_is, mode));
        }

        importer_dir
            .ancestors()
            .map(|dir| dir.join("node_modules").join(specifier))
            .find_map(|candidate| probe(&candidate, mode))
    }
}

/// Probe a candidate path: exact file, then with extensions, then as a
/// package or directory.
fn probe(candidate: &Path, mode: ExecutionMode) -> Option<PathBuf> {
    let candidate = normalize(candidate);
    if candidate.is_file() {
        return Some(candidate);
    }

    for ext in EXTENSIONS {
        let with_ext = PathBuf::from(format!("{}{ext}", candidate.display()));
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }

    if candidate.is_dir() {
        if let Some(entry) = package_entry(&candidate, mode) {
            let entry_path = candidate.join(entry);
            if entry_path.is_file() {
                return Some(normalize(&entry_path));
            }
        }
        for ext in EXTENSIONS {
            let index = candidate.join(format!("index{ext}"));
            if index.is_file() {
                return Some(index);
            }
        }
    }

    None
}

/// Entry point from `package.json`, honoring the `browser` field in client
/// mode.
fn package_entry(dir: &Path, mode: ExecutionMode) -> Option<String> {
    let source = std::fs::read_to_string(dir.join("package.json")).ok()?;
    let pkg: Value = serde_json::from_str(&source).ok()?;

    let fields: &[&str] = match mode {
        ExecutionMode::Client => &["browser", "module", "main"],
        ExecutionMode::Server => &["module", "main"],
    };
    fields
        .iter()
        .find_map(|field| pkg.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}

/// Wrap CSS in a module. In client mode the module injects a `<style>` tag.
fn css_module(css: &str, mode: ExecutionMode) -> String {
    let literal = js_string(css);
    match mode {
        ExecutionMode::Server => format!("export default {literal};\n"),
        ExecutionMode::Client => format!(
            r#"const css = {literal};
const style = document.createElement('style');
style.setAttribute('data-nodefetch-css', '');
style.textContent = css;
document.head.appendChild(style);

if (import.meta.hot) {{
  import.meta.hot.accept();
  import.meta.hot.dispose(() => {{
    style.remove();
  }});
}}

export default css;
"#
        ),
    }
}

fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

#[async_trait]
impl ModuleHost for FsHost {
    async fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
        mode: ExecutionMode,
    ) -> HostResult<Option<ResolvedId>> {
        let (bare, query) = match specifier.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (specifier, None),
        };

        let Some(path) = self.resolve_path(bare, importer, mode) else {
            trace!(specifier, ?importer, %mode, "Unresolved");
            return Ok(None);
        };

        let mut id = slash(&path.to_string_lossy());
        if let Some(query) = query {
            id.push('?');
            id.push_str(query);
        }
        Ok(Some(ResolvedId::resolved(id)))
    }

    async fn transform(
        &self,
        id: &str,
        path: &Path,
        mode: ExecutionMode,
    ) -> HostResult<Option<PipelineOutput>> {
        self.graph.ensure_module(path, id);

        let path_str = path.to_string_lossy();
        let (file_str, query) = match path_str.split_once('?') {
            Some((file, query)) => (file.to_string(), Some(query.to_string())),
            None => (path_str.to_string(), None),
        };
        let file = PathBuf::from(&file_str);

        let read_from = file.clone();
        let source = tokio::task::spawn_blocking(move || nodefetch_util::fs::read_source(&read_from))
            .await
            .map_err(|e| HostError::transform(format!("Load task failed for {file_str}: {e}")))?
            .map_err(|e| HostError::new("load", format!("Failed to read {file_str}: {e}")))?;

        let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("");
        let mut code = if query.as_deref() == Some("raw") {
            format!("export default {};\n", js_string(&source))
        } else {
            match ext {
                "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" | "mts" | "cts" => source.clone(),
                "json" => format!("export default {};\n", source.trim()),
                "css" => css_module(&source, mode),
                _ => return Ok(None),
            }
        };

        for (name, hook) in &self.hooks {
            if let Some(next) = hook(&code, id, mode)? {
                trace!(hook = %name, id, %mode, "Hook transformed module");
                code = next;
            }
        }

        let map = SourceMap::identity(&slash(&file_str), &source);
        Ok(Some(PipelineOutput::code(code).with_map(map)))
    }

    fn freshness_marker(&self, path: &Path) -> Option<u64> {
        self.graph.freshness_marker(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn project() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/lib")).unwrap();
        fs::write(root.join("src/main.ts"), "import './lib';\n").unwrap();
        fs::write(root.join("src/lib/index.js"), "export const x = 1;\n").unwrap();
        fs::write(root.join("src/data.json"), "{\"a\": 1}\n").unwrap();
        fs::write(root.join("src/app.css"), "body { color: red; }").unwrap();
        fs::write(root.join("src/notes.txt"), "hello").unwrap();

        let pkg = root.join("node_modules/dual");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(
            pkg.join("package.json"),
            r#"{"main": "node.js", "browser": "browser.js"}"#,
        )
        .unwrap();
        fs::write(pkg.join("node.js"), "module.exports = 'node';").unwrap();
        fs::write(pkg.join("browser.js"), "export default 'browser';").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_resolve_root_relative_and_relative() {
        let dir = project();
        let host = FsHost::new(dir.path().to_path_buf());

        let main = host
            .resolve_id("/src/main", None, ExecutionMode::Server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(PathBuf::from(&main.id), dir.path().join("src/main.ts"));

        let lib = host
            .resolve_id("./lib", Some(&main.id), ExecutionMode::Server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(PathBuf::from(&lib.id), dir.path().join("src/lib/index.js"));

        let missing = host
            .resolve_id("./nope", Some(&main.id), ExecutionMode::Server)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_resolve_bare_specifier_depends_on_mode() {
        let dir = project();
        let host = FsHost::new(dir.path().to_path_buf());

        let server = host
            .resolve_id("dual", None, ExecutionMode::Server)
            .await
            .unwrap()
            .unwrap();
        let client = host
            .resolve_id("dual", None, ExecutionMode::Client)
            .await
            .unwrap()
            .unwrap();
        assert!(server.id.ends_with("node_modules/dual/node.js"));
        assert!(client.id.ends_with("node_modules/dual/browser.js"));
    }

    #[tokio::test]
    async fn test_resolve_keeps_query() {
        let dir = project();
        let host = FsHost::new(dir.path().to_path_buf());
        let css = host
            .resolve_id("/src/app.css?raw", None, ExecutionMode::Client)
            .await
            .unwrap()
            .unwrap();
        assert!(css.id.ends_with("src/app.css?raw"));
    }

    #[tokio::test]
    async fn test_transform_registers_module_and_wraps_assets() {
        let dir = project();
        let host = FsHost::new(dir.path().to_path_buf());
        let json = dir.path().join("src/data.json");

        assert_eq!(host.freshness_marker(&json), None);
        let out = host
            .transform("/src/data.json", &json, ExecutionMode::Server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.code, "export default {\"a\": 1};\n");
        assert_eq!(host.freshness_marker(&json), Some(0));

        let css = dir.path().join("src/app.css");
        let client = host
            .transform("/src/app.css", &css, ExecutionMode::Client)
            .await
            .unwrap()
            .unwrap();
        assert!(client.code.contains("document.createElement('style')"));
        let server = host
            .transform("/src/app.css", &css, ExecutionMode::Server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(server.code, "export default \"body { color: red; }\";\n");
    }

    #[tokio::test]
    async fn test_transform_unsupported_and_missing() {
        let dir = project();
        let host = FsHost::new(dir.path().to_path_buf());

        let txt = dir.path().join("src/notes.txt");
        assert!(host
            .transform("/src/notes.txt", &txt, ExecutionMode::Server)
            .await
            .unwrap()
            .is_none());

        let gone = dir.path().join("src/gone.js");
        let err = host
            .transform("/src/gone.js", &gone, ExecutionMode::Server)
            .await
            .unwrap_err();
        assert_eq!(err.hook, "load");
    }

    #[tokio::test]
    async fn test_hooks_run_in_order_with_mode() {
        let dir = project();
        let host = FsHost::new(dir.path().to_path_buf())
            .with_hook(
                "banner",
                Arc::new(
                    |code: &str, _id: &str, mode: ExecutionMode| -> HostResult<Option<String>> {
                        Ok(Some(format!("// {mode}\n{code}")))
                    },
                ),
            )
            .with_hook(
                "noop",
                Arc::new(
                    |_code: &str, _id: &str, _mode: ExecutionMode| -> HostResult<Option<String>> {
                        Ok(None)
                    },
                ),
            );

        let lib = dir.path().join("src/lib/index.js");
        let out = host
            .transform("/src/lib/index.js", &lib, ExecutionMode::Client)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.code, "// client\nexport const x = 1;\n");
        assert_eq!(
            out.map.unwrap().sources,
            vec![slash(&lib.to_string_lossy())]
        );
    }
}
