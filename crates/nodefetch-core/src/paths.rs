use std::path::{Path, PathBuf};

/// Config file names in priority order.
pub const CONFIG_FILES: &[&str] = &["nodefetch.json", ".nodefetchrc.json"];

/// Find the project root by walking up from `cwd` looking for `package.json` or `.git`.
///
/// Returns the first directory containing either marker, or `None` if neither is found.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    cwd.ancestors()
        .find(|dir| dir.join("package.json").exists() || dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Find a config file directly inside `root`.
#[must_use]
pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}

/// The dependency cache a Vite-style host keeps pre-optimized packages in.
#[must_use]
pub fn default_cache_dir(root: &Path) -> PathBuf {
    root.join("node_modules").join(".vite")
}
