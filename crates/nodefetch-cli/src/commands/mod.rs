pub mod fetch;
pub mod resolve;
pub mod version;
pub mod watch;

use miette::{IntoDiagnostic, Result};
use nodefetch_core::paths::{find_config_file, project_root};
use nodefetch_core::FetchOptions;
use nodefetch_util::path::{normalize, slash};
use serde::Serialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Error response for JSON output.
#[derive(Serialize)]
struct ErrorResult {
    ok: bool,
    error: String,
}

/// Canonical working directory. Falls back to the path as given.
fn canonical_cwd(cwd: &Path) -> PathBuf {
    dunce::canonicalize(cwd).unwrap_or_else(|_| cwd.to_path_buf())
}

/// Load fetch options for the project containing `cwd`.
///
/// An explicit `config` is taken relative to `cwd`. Otherwise the project
/// root is the nearest directory with a `package.json` or `.git`, and a
/// `nodefetch.json` there is used if present.
pub fn load_options(cwd: &Path, config: Option<&Path>) -> Result<FetchOptions> {
    let cwd = canonical_cwd(cwd);

    if let Some(config) = config {
        let path = cwd.join(config);
        debug!(config = %path.display(), "Loading config");
        return FetchOptions::load(&path).into_diagnostic();
    }

    let root = project_root(&cwd).unwrap_or_else(|| cwd.clone());
    match find_config_file(&root) {
        Some(path) => {
            debug!(config = %path.display(), "Loading config");
            FetchOptions::load(&path).into_diagnostic()
        }
        None => {
            debug!(root = %root.display(), "No config file, using defaults");
            Ok(FetchOptions::new(root))
        }
    }
}

/// Turn a command-line module id into one the fetcher understands.
///
/// `./` and `../` ids are taken relative to `cwd` and made absolute. Every
/// other id is passed through.
pub fn module_id(cwd: &Path, id: &str) -> String {
    if id.starts_with("./") || id.starts_with("../") {
        let path = normalize(&canonical_cwd(cwd).join(id));
        return slash(&path.to_string_lossy());
    }
    id.to_string()
}

/// Report a failure: a JSON error object on stdout and exit code 1 in JSON
/// mode, a diagnostic otherwise.
pub fn fail(json: bool, error: impl Display) -> Result<()> {
    if json {
        let result = ErrorResult {
            ok: false,
            error: error.to_string(),
        };
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
        std::process::exit(1);
    }
    Err(miette::miette!("{error}"))
}
