//! Resolution adapter: forwards specifiers to the host resolver, tagged with
//! the mode the importer runs in. Nothing is cached here.

use crate::config::FetchOptions;
use crate::error::FetchError;
use crate::host::{ModuleHost, ResolvedId};
use crate::ids::{normalize_module_id, to_file_path};
use crate::mode::ExecutionMode;
use nodefetch_util::path::slash;
use std::path::Path;
use tracing::trace;

/// Make `importer` absolute.
///
/// Ids already under `root` are kept. Root-relative ids are joined onto
/// `root` when the file exists there. Relative ids are joined onto `root`.
pub(super) fn absolutize_importer(importer: &str, root: &Path) -> String {
    let importer = normalize_module_id(importer);
    if importer.starts_with('/') || Path::new(&importer).is_absolute() {
        let (path, _) = to_file_path(&importer, root);
        return slash(&path.to_string_lossy());
    }
    slash(&root.join(&importer).to_string_lossy())
}

pub(super) async fn resolve_id(
    host: &dyn ModuleHost,
    options: &FetchOptions,
    specifier: &str,
    importer: Option<&str>,
    mode: Option<ExecutionMode>,
) -> Result<Option<ResolvedId>, FetchError> {
    let importer = importer.map(|i| absolutize_importer(i, &options.root));
    let mode = mode
        .or_else(|| {
            importer
                .as_deref()
                .map(|i| options.transform_mode.mode_for(i))
        })
        .unwrap_or(ExecutionMode::Server);

    trace!(specifier, ?importer, %mode, "Resolving");
    host.resolve_id(specifier, importer.as_deref(), mode)
        .await
        .map_err(|source| FetchError::Resolution {
            specifier: specifier.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_absolutize_importer() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.ts"), "").unwrap();
        let root = dir.path();
        let expected = slash(&root.join("src/main.ts").to_string_lossy());

        assert_eq!(absolutize_importer("/src/main.ts", root), expected);
        assert_eq!(absolutize_importer("src/main.ts", root), expected);
        assert_eq!(absolutize_importer(&expected, root), expected);
        assert_eq!(
            absolutize_importer("/elsewhere/a.ts", root),
            "/elsewhere/a.ts"
        );
    }
}
