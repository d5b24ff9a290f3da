//! `nodefetch fetch` command implementation.

use miette::{IntoDiagnostic, Result};
use nodefetch_core::{ExecutionMode, FetchResult, FsHost, ModuleFetcher};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Fetch response for JSON output.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchOutput<'a> {
    ok: bool,
    id: &'a str,
    mode: ExecutionMode,
    #[serde(flatten)]
    result: &'a FetchResult,
}

/// Run the fetch command.
pub fn run(
    cwd: &Path,
    id: &str,
    mode: Option<ExecutionMode>,
    config: Option<&Path>,
    out: Option<&Path>,
    json: bool,
) -> Result<()> {
    let options = super::load_options(cwd, config)?;
    let id = super::module_id(cwd, id);

    let host = Arc::new(FsHost::new(options.root.clone()));
    let fetcher = ModuleFetcher::new(host, options);
    let mode = mode.unwrap_or_else(|| fetcher.transform_mode(&id));

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let result = match runtime.block_on(fetcher.fetch_module(&id, Some(mode))) {
        Ok(result) => result,
        Err(e) => return super::fail(json, e),
    };

    if let (Some(out), Some(code)) = (out, result.code.as_deref()) {
        let path = cwd.join(out);
        nodefetch_util::fs::write_output(&path, code.as_bytes()).into_diagnostic()?;
        info!(path = %path.display(), bytes = code.len(), "Wrote module");
    }

    if json {
        let output = FetchOutput {
            ok: true,
            id: &id,
            mode,
            result: &result,
        };
        println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        return Ok(());
    }

    match (&result.externalize, &result.code) {
        (Some(target), _) => println!("externalize: {target}"),
        (None, Some(code)) if out.is_none() => print!("{code}"),
        _ => {}
    }
    Ok(())
}
