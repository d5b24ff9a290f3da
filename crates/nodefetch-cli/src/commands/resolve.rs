//! `nodefetch resolve` command implementation.

use miette::{IntoDiagnostic, Result};
use nodefetch_core::{ExecutionMode, FsHost, ModuleFetcher};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Resolve response for JSON output.
#[derive(Serialize)]
struct ResolveOutput<'a> {
    ok: bool,
    specifier: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    importer: Option<&'a str>,
    /// `null` when the host could not resolve the specifier.
    id: Option<String>,
    external: bool,
}

/// Run the resolve command.
pub fn run(
    cwd: &Path,
    specifier: &str,
    importer: Option<&str>,
    mode: Option<ExecutionMode>,
    config: Option<&Path>,
    json: bool,
) -> Result<()> {
    let options = super::load_options(cwd, config)?;
    let importer = importer.map(|i| super::module_id(cwd, i));

    let host = Arc::new(FsHost::new(options.root.clone()));
    let fetcher = ModuleFetcher::new(host, options);

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let resolved = match runtime.block_on(fetcher.resolve_id(specifier, importer.as_deref(), mode)) {
        Ok(resolved) => resolved,
        Err(e) => return super::fail(json, e),
    };

    if json {
        let output = ResolveOutput {
            ok: true,
            specifier,
            importer: importer.as_deref(),
            external: resolved.as_ref().is_some_and(|r| r.external),
            id: resolved.map(|r| r.id),
        };
        println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        return Ok(());
    }

    match resolved {
        Some(r) if r.external => println!("{} (external)", r.id),
        Some(r) => println!("{}", r.id),
        None => return super::fail(false, format!("Cannot resolve '{specifier}'")),
    }
    Ok(())
}
