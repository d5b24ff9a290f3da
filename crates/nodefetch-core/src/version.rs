use std::fmt::Write;

/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Marker written next to inline source maps this crate embeds.
pub const SOURCE_MARKER: &str = "nodefetch";

/// Returns a formatted version string including build metadata if available.
#[must_use]
pub fn version_string() -> String {
    let mut s = format!("nodefetch {VERSION}");

    if let Some(hash) = option_env!("NODEFETCH_BUILD_GIT_HASH") {
        let _ = write!(s, " ({hash})");
    }

    s
}
