//! Lexical path helpers.
//!
//! Module identifiers are URL-like strings that always use `/`, while cache
//! keys are native paths. Nothing here touches the filesystem.

use std::path::{Component, Path, PathBuf};

/// Replace Windows separators with `/`.
#[must_use]
pub fn slash(s: &str) -> String {
    s.replace('\\', "/")
}

/// Append a trailing `/` unless one is already present.
#[must_use]
pub fn with_trailing_slash(s: &str) -> String {
    if s.ends_with('/') {
        s.to_owned()
    } else {
        format!("{s}/")
    }
}

/// Drop a `?query` suffix from a module id.
#[must_use]
pub fn strip_query(id: &str) -> &str {
    id.split_once('?').map_or(id, |(path, _)| path)
}

/// Resolve `.` and `..` components without consulting the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `path` is `dir` or lies beneath it, compared lexically.
#[must_use]
pub fn is_within(path: &Path, dir: &Path) -> bool {
    normalize(path).starts_with(normalize(dir))
}
