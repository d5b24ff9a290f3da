//! Fetch configuration.
//!
//! Loaded from `nodefetch.json` (camelCase keys) or built in code:
//!
//! ```json
//! {
//!   "root": ".",
//!   "cacheDir": "node_modules/.vite",
//!   "deps": { "inline": ["node_modules/.vite", "/-esm\\.js$/"], "external": [] },
//!   "transformMode": { "server": [], "client": ["/\\.vue$/"] },
//!   "sourcemap": true
//! }
//! ```
//!
//! A pattern written as `/body/` (optionally followed by `i`) is a regular
//! expression; any other string matches as a substring. This applies to every
//! string of that shape, path-like ones included: `"/src/"` is the regex
//! `src` and `"/foo/i"` is a case-insensitive `foo`. To match the literal
//! text `/src/`, put the slashes inside the regex body: `"//src//"`.

use crate::error::Error;
use crate::mode::ExecutionMode;
use crate::paths;
use nodefetch_util::path::strip_query;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A substring or regular-expression pattern matched against module ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Pattern {
    Substring(String),
    Regex(Regex),
}

impl Pattern {
    /// Build a substring pattern.
    pub fn substring(s: impl Into<String>) -> Self {
        Self::Substring(s.into())
    }

    /// Build a regex pattern.
    pub fn regex(re: &str) -> Result<Self, Error> {
        Regex::new(re)
            .map(Self::Regex)
            .map_err(|e| Error::other(format!("Invalid pattern /{re}/: {e}")))
    }

    #[must_use]
    pub fn matches(&self, id: &str) -> bool {
        match self {
            Self::Substring(s) => id.contains(s.as_str()),
            Self::Regex(re) => re.is_match(id),
        }
    }
}

impl TryFrom<String> for Pattern {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        if raw.len() >= 2 && raw.starts_with('/') {
            if let Some(end) = raw.rfind('/').filter(|&i| i > 0) {
                let flags = &raw[end + 1..];
                if flags.chars().all(|c| c == 'i') {
                    let body = &raw[1..end];
                    return if flags.is_empty() {
                        Self::regex(body)
                    } else {
                        Self::regex(&format!("(?i){body}"))
                    };
                }
            }
        }
        Ok(Self::Substring(raw))
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        match pattern {
            Pattern::Substring(s) => s,
            Pattern::Regex(re) => format!("/{}/", re.as_str()),
        }
    }
}

/// Whether dependencies should be inlined (transformed) rather than
/// externalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InlineDeps {
    /// `true` inlines everything.
    All(bool),
    /// Ids matching any pattern are inlined.
    Patterns(Vec<Pattern>),
}

impl Default for InlineDeps {
    fn default() -> Self {
        Self::Patterns(Vec::new())
    }
}

impl InlineDeps {
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All(true))
    }

    #[must_use]
    pub fn patterns(&self) -> &[Pattern] {
        match self {
            Self::Patterns(p) => p,
            Self::All(_) => &[],
        }
    }
}

/// Dependency handling options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DepsOptions {
    /// Modules to transform even though they would be externalized.
    pub inline: InlineDeps,
    /// Modules to always import natively.
    pub external: Vec<Pattern>,
}

/// Rules that pick an execution mode for ids requested without one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformModeRules {
    /// Ids forced into server mode.
    pub server: Vec<Pattern>,
    /// Ids forced into client mode.
    pub client: Vec<Pattern>,
}

impl TransformModeRules {
    /// Pick the mode for `id`.
    ///
    /// Client patterns win over server patterns. Without a match, script and
    /// JSON files run in server mode and everything else in client mode.
    #[must_use]
    pub fn mode_for(&self, id: &str) -> ExecutionMode {
        let path = strip_query(id);
        if self.client.iter().any(|p| p.matches(path)) {
            return ExecutionMode::Client;
        }
        if self.server.iter().any(|p| p.matches(path)) {
            return ExecutionMode::Server;
        }
        if has_script_extension(path) {
            ExecutionMode::Server
        } else {
            ExecutionMode::Client
        }
    }
}

fn has_script_extension(path: &str) -> bool {
    const SCRIPT_EXTS: &[&str] = &[
        ".js", ".jsx", ".ts", ".tsx", ".mjs", ".mts", ".cjs", ".cts", ".json",
    ];
    SCRIPT_EXTS.iter().any(|ext| path.ends_with(ext))
}

/// Configuration consumed by [`crate::ModuleFetcher`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchOptions {
    /// Project root. Root-relative ids (`/src/a.ts`) resolve against it.
    pub root: PathBuf,

    /// The host's persistent dependency cache. Defaults to
    /// `<root>/node_modules/.vite`.
    pub cache_dir: Option<PathBuf>,

    /// Inline/external dependency patterns.
    pub deps: DepsOptions,

    /// Mode selection for requests that do not name a mode.
    pub transform_mode: TransformModeRules,

    /// Embed the normalized source map inline in fetched code.
    pub sourcemap: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            cache_dir: None,
            deps: DepsOptions::default(),
            transform_mode: TransformModeRules::default(),
            sourcemap: true,
        }
    }
}

impl FetchOptions {
    /// Create options for the given project root.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Default::default()
        }
    }

    /// Load options from a JSON file. A relative `root` is taken relative to
    /// the file's directory, a relative `cacheDir` relative to `root`.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let source = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut options: Self =
            serde_json::from_str(&source).map_err(|source| Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or(Path::new("."));
        if options.root.as_os_str().is_empty() || options.root.is_relative() {
            options.root = nodefetch_util::path::normalize(&base.join(&options.root));
        }
        if let Some(dir) = options.cache_dir.take() {
            options.cache_dir = Some(if dir.is_relative() {
                options.root.join(dir)
            } else {
                dir
            });
        }
        Ok(options)
    }

    /// The effective dependency cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| paths::default_cache_dir(&self.root))
    }

    /// Set the dependency cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    /// Inline every dependency (`deps.inline = true`).
    #[must_use]
    pub fn with_inline_all(mut self, inline: bool) -> Self {
        self.deps.inline = InlineDeps::All(inline);
        self
    }

    /// Add an inline pattern.
    #[must_use]
    pub fn with_inline(mut self, pattern: Pattern) -> Self {
        match &mut self.deps.inline {
            InlineDeps::Patterns(list) => list.push(pattern),
            InlineDeps::All(_) => self.deps.inline = InlineDeps::Patterns(vec![pattern]),
        }
        self
    }

    /// Add an external pattern.
    #[must_use]
    pub fn with_external(mut self, pattern: Pattern) -> Self {
        self.deps.external.push(pattern);
        self
    }

    /// Set transform mode rules.
    #[must_use]
    pub fn with_transform_mode(mut self, rules: TransformModeRules) -> Self {
        self.transform_mode = rules;
        self
    }

    /// Enable or disable inline source maps.
    #[must_use]
    pub fn with_sourcemap(mut self, sourcemap: bool) -> Self {
        self.sourcemap = sourcemap;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pattern_parsing() {
        let re = Pattern::try_from("/\\.vite/".to_string()).unwrap();
        assert!(matches!(re, Pattern::Regex(_)));
        assert!(re.matches("/node_modules/.vite/dep.js"));

        let ci = Pattern::try_from("/WEB/i".to_string()).unwrap();
        assert!(ci.matches("/src/web/app.ts"));

        let sub = Pattern::try_from("lodash-es".to_string()).unwrap();
        assert!(matches!(sub, Pattern::Substring(_)));
        assert!(sub.matches("/node_modules/lodash-es/index.js"));

        // A leading slash alone does not make a regex.
        let path = Pattern::try_from("/src/a.ts".to_string()).unwrap();
        assert!(matches!(path, Pattern::Substring(_)));
    }

    #[test]
    fn test_slash_delimited_path_is_a_regex() {
        let loose = Pattern::try_from("/src/".to_string()).unwrap();
        assert!(matches!(loose, Pattern::Regex(_)));
        assert!(loose.matches("/p/resources/a.ts"));

        let literal: Pattern = serde_json::from_str(r#""//src//""#).unwrap();
        assert!(literal.matches("/p/src/a.ts"));
        assert!(!literal.matches("/p/resources/a.ts"));
    }

    #[test]
    fn test_transform_mode_rules() {
        let rules = TransformModeRules {
            server: vec![Pattern::regex("ssr").unwrap()],
            client: vec![Pattern::regex("web").unwrap()],
        };
        assert_eq!(rules.mode_for("/web/app.ts"), ExecutionMode::Client);
        assert_eq!(rules.mode_for("/ssr/page.vue"), ExecutionMode::Server);
        assert_eq!(rules.mode_for("/src/a.ts?v=1"), ExecutionMode::Server);
        assert_eq!(rules.mode_for("/src/App.vue"), ExecutionMode::Client);
        assert_eq!(rules.mode_for("/src/style.css"), ExecutionMode::Client);
    }

    #[test]
    fn test_load_config_resolves_relative_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nodefetch.json");
        std::fs::write(
            &path,
            r#"{
                "root": "app",
                "cacheDir": ".cache/deps",
                "deps": { "inline": true },
                "transformMode": { "client": ["/\\.vue$/"] },
                "sourcemap": false
            }"#,
        )
        .unwrap();

        let options = FetchOptions::load(&path).unwrap();
        assert_eq!(options.root, dir.path().join("app"));
        assert_eq!(options.cache_dir(), dir.path().join("app/.cache/deps"));
        assert!(options.deps.inline.is_all());
        assert!(!options.sourcemap);
        assert_eq!(
            options.transform_mode.mode_for("/a.vue"),
            ExecutionMode::Client
        );
    }

    #[test]
    fn test_load_config_without_root_uses_file_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nodefetch.json");
        std::fs::write(&path, r#"{ "deps": { "external": ["left-pad"] } }"#).unwrap();

        let options = FetchOptions::load(&path).unwrap();
        assert_eq!(options.root, dir.path());
        assert!(options.sourcemap);
        assert_eq!(options.deps.external.len(), 1);
    }

    #[test]
    fn test_load_config_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nodefetch.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            FetchOptions::load(&path),
            Err(Error::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_default_cache_dir() {
        let options = FetchOptions::new(PathBuf::from("/proj"));
        assert_eq!(options.cache_dir(), PathBuf::from("/proj/node_modules/.vite"));
    }
}
