use miette::{IntoDiagnostic, Result};
use nodefetch_core::version::version_string;
use nodefetch_core::VERSION;
use serde::Serialize;

#[derive(Serialize)]
struct VersionResult {
    name: &'static str,
    version: &'static str,
}

pub fn run(json: bool) -> Result<()> {
    if json {
        let result = VersionResult {
            name: "nodefetch",
            version: VERSION,
        };
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
    } else {
        println!("{}", version_string());
    }
    Ok(())
}
