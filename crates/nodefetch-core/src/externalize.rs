//! Externalization: which modules bypass the transform pipeline and are
//! imported natively by the host runtime.
//!
//! Decision order:
//!
//! 1. Node builtins and `data:` URLs are always external.
//! 2. `deps.inline: true` inlines everything else.
//! 3. User inline patterns win over everything below.
//! 4. User external patterns.
//! 5. Anything in the host's dependency cache directory.
//! 6. Built-in inline defaults (virtual modules, TypeScript, asset queries,
//!    ESM files outside `node_modules`).
//! 7. Built-in external defaults inside `node_modules` (`.mjs`, `.cjs.js`).
//! 8. Other `node_modules` files that Node can import directly.

use crate::config::{FetchOptions, Pattern};
use crate::ids::{is_data_url, is_in_node_modules, is_node_builtin};
use nodefetch_util::path::{slash, strip_query};
use regex_lite::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Decide whether `id` should be imported natively.
///
/// Returns the specifier to hand to the runtime, or `None` if the module
/// must go through the transform pipeline.
pub async fn should_externalize(id: &str, options: &FetchOptions) -> Option<String> {
    let decision = decide(id, options).await;
    if let Some(target) = &decision {
        debug!(id, target = %target, "Externalized");
    }
    decision
}

async fn decide(id: &str, options: &FetchOptions) -> Option<String> {
    if is_node_builtin(id) || is_data_url(id) {
        return Some(id.to_string());
    }
    if options.deps.inline.is_all() {
        return None;
    }

    let id = slash(id);

    if matches_any(&id, options.deps.inline.patterns()) {
        return None;
    }
    if matches_any(&id, &options.deps.external) {
        return Some(id);
    }

    let cache_dir = slash(&options.cache_dir().to_string_lossy());
    if !cache_dir.is_empty() && id.contains(cache_dir.trim_end_matches('/')) {
        return Some(id);
    }

    let in_node_modules = is_in_node_modules(&id);
    if is_default_inline(&id, in_node_modules) {
        return None;
    }
    if in_node_modules && is_default_external(&id) {
        return Some(id);
    }
    if in_node_modules && is_valid_node_import(&id).await {
        return Some(id);
    }
    None
}

/// Match against the id, and against the id with everything up to the last
/// `node_modules/` removed so patterns can name packages directly.
fn matches_any(id: &str, patterns: &[Pattern]) -> bool {
    let package_relative = id
        .rfind("/node_modules/")
        .map(|i| &id[i + "/node_modules/".len()..]);
    patterns.iter().any(|p| {
        p.matches(id) || package_relative.is_some_and(|rel| p.matches(rel))
    })
}

fn asset_query_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[?&](init|raw|url|inline)\b").ok()).as_ref()
}

fn is_default_inline(id: &str, in_node_modules: bool) -> bool {
    let path = strip_query(id);
    id.contains("virtual:")
        || id.starts_with("__x00__")
        || path.ends_with(".ts")
        || path.ends_with(".mts")
        || path.ends_with(".cts")
        || asset_query_regex().is_some_and(|re| re.is_match(id))
        || (!in_node_modules && (path.ends_with(".mjs") || path.ends_with(".cjs.js")))
}

fn is_default_external(id: &str) -> bool {
    let path = strip_query(id);
    path.ends_with(".mjs") || path.ends_with(".cjs.js")
}

fn esm_filename_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\.(es|esm|esm-browser|esm-bundler|es6|module)\.js$)|(/(es|esm)/[^?]*\.js$)")
            .ok()
    })
    .as_ref()
}

fn esm_syntax_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*(import\s*[\w*{'"]|import\s*\(|export\s+(default|const|let|var|function|class|async|\{|\*))"#)
            .ok()
    })
    .as_ref()
}

/// Whether Node can load `id` without a transform.
async fn is_valid_node_import(id: &str) -> bool {
    let path = PathBuf::from(strip_query(id));
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext {
        "mjs" | "cjs" | "node" | "wasm" => return true,
        "js" => {}
        _ => return false,
    }

    if nearest_package_type(&path).await.as_deref() == Some("module") {
        return true;
    }
    if esm_filename_regex().is_some_and(|re| re.is_match(&slash(&path.to_string_lossy()))) {
        return false;
    }

    match tokio::fs::read_to_string(&path).await {
        Ok(code) => !esm_syntax_regex().is_some_and(|re| re.is_match(&code)),
        Err(_) => false,
    }
}

/// The `type` field of the closest `package.json` above `path`.
async fn nearest_package_type(path: &Path) -> Option<String> {
    for dir in path.ancestors().skip(1) {
        let Ok(source) = tokio::fs::read_to_string(dir.join("package.json")).await else {
            continue;
        };
        let pkg: Value = serde_json::from_str(&source).ok()?;
        return Some(
            pkg.get("type")
                .and_then(Value::as_str)
                .unwrap_or("commonjs")
                .to_string(),
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn options() -> FetchOptions {
        FetchOptions::new(PathBuf::from("/"))
            .with_cache_dir(PathBuf::from("/node_modules/.vite"))
    }

    #[tokio::test]
    async fn test_cache_dir_is_external_by_default() {
        let externalized = should_externalize("/node_modules/.vite/cached.js", &options()).await;
        assert_eq!(externalized.as_deref(), Some("/node_modules/.vite/cached.js"));
    }

    #[tokio::test]
    async fn test_inline_all_suppresses_externalization() {
        let opts = options().with_inline_all(true);
        assert!(should_externalize("/node_modules/.vite/cached.js", &opts)
            .await
            .is_none());

        // Builtins and data URLs can never be inlined.
        assert_eq!(
            should_externalize("node:fs", &opts).await.as_deref(),
            Some("node:fs")
        );
        assert!(should_externalize("data:text/javascript,export{}", &opts)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_inline_pattern_matching_cache_dir() {
        let opts = options().with_inline(Pattern::regex(r"node_modules/\.vite").unwrap());
        assert!(should_externalize("/node_modules/.vite/cached.js", &opts)
            .await
            .is_none());

        let opts = options().with_inline(Pattern::substring(".vite/cached"));
        assert!(should_externalize("/node_modules/.vite/cached.js", &opts)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_builtins_and_data_urls() {
        assert_eq!(
            should_externalize("node:path", &options()).await.as_deref(),
            Some("node:path")
        );
        assert_eq!(
            should_externalize("fs", &options()).await.as_deref(),
            Some("fs")
        );
        let data = "data:text/javascript,export default 1";
        assert_eq!(should_externalize(data, &options()).await.as_deref(), Some(data));
    }

    #[tokio::test]
    async fn test_external_pattern_by_package_name() {
        let opts = options().with_external(Pattern::regex("^left-pad/").unwrap());
        assert!(should_externalize("/proj/node_modules/left-pad/index.ts", &opts)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_default_inline_rules() {
        let opts = options();
        assert!(should_externalize("/src/app.ts", &opts).await.is_none());
        assert!(should_externalize("/src/util.mjs", &opts).await.is_none());
        assert!(should_externalize("/proj/node_modules/pkg/a.mjs?raw", &opts)
            .await
            .is_none());
        assert!(should_externalize("__x00__virtual:env", &opts).await.is_none());
    }

    #[tokio::test]
    async fn test_node_modules_defaults() {
        let opts = options();
        assert!(should_externalize("/proj/node_modules/pkg/index.mjs", &opts)
            .await
            .is_some());
        assert!(should_externalize("/proj/node_modules/pkg/index.cjs.js", &opts)
            .await
            .is_some());
        assert!(should_externalize("/proj/node_modules/pkg/index.cjs", &opts)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_node_modules_js_depends_on_syntax_and_package_type() {
        let dir = tempdir().unwrap();
        let nm = dir.path().join("node_modules");

        let cjs = nm.join("cjs-pkg");
        fs::create_dir_all(&cjs).unwrap();
        fs::write(cjs.join("package.json"), r#"{"name":"cjs-pkg"}"#).unwrap();
        fs::write(cjs.join("index.js"), "module.exports = 1;\n").unwrap();

        let esm = nm.join("esm-pkg");
        fs::create_dir_all(&esm).unwrap();
        fs::write(esm.join("package.json"), r#"{"name":"esm-pkg"}"#).unwrap();
        fs::write(esm.join("index.js"), "export const a = 1;\n").unwrap();

        let typed = nm.join("typed-pkg");
        fs::create_dir_all(&typed).unwrap();
        fs::write(typed.join("package.json"), r#"{"type":"module"}"#).unwrap();
        fs::write(typed.join("index.js"), "export const a = 1;\n").unwrap();

        let opts = FetchOptions::new(dir.path().to_path_buf());
        let id = |p: PathBuf| slash(&p.to_string_lossy());

        assert!(should_externalize(&id(cjs.join("index.js")), &opts)
            .await
            .is_some());
        assert!(should_externalize(&id(esm.join("index.js")), &opts)
            .await
            .is_none());
        assert!(should_externalize(&id(typed.join("index.js")), &opts)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_source_files_are_not_externalized() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.js"), "module.exports = 1;").unwrap();
        let opts = FetchOptions::new(dir.path().to_path_buf());
        let id = slash(&dir.path().join("main.js").to_string_lossy());
        assert!(should_externalize(&id, &opts).await.is_none());
    }
}
