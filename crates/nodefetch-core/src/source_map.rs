//! Inline source map handling.
//!
//! Transformed code may end with a `//# sourceMappingURL=data:...;base64,...`
//! comment. We pull that map out, rewrite its sources so a debugger can find
//! them next to the module on disk, and re-embed it behind a marker comment
//! so the map we produced can be told apart from whatever the pipeline left.

use crate::version::SOURCE_MARKER;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use nodefetch_util::path::{is_within, normalize, slash};
use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::sync::OnceLock;

const MAPPING_URL_PREFIX: &str = "//# sourceMappingURL=data:application/json;charset=utf-8;base64,";

/// A version 3 source map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    /// `null` entries decode as empty strings.
    #[serde(default, deserialize_with = "nullable_strings")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub mappings: String,
}

fn default_version() -> u32 {
    3
}

fn nullable_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Option<String>> = Vec::deserialize(deserializer)?;
    Ok(raw.into_iter().map(Option::unwrap_or_default).collect())
}

impl SourceMap {
    /// A map where generated line `n` maps to column 0 of source line `n`.
    #[must_use]
    pub fn identity(source_path: &str, content: &str) -> Self {
        let lines = content.lines().count().max(1);
        let mut mappings = String::with_capacity(lines * 5);
        mappings.push_str("AAAA");
        for _ in 1..lines {
            mappings.push_str(";AACA");
        }
        Self {
            version: 3,
            file: None,
            source_root: None,
            sources: vec![source_path.to_string()],
            sources_content: Some(vec![Some(content.to_string())]),
            names: Vec::new(),
            mappings,
        }
    }

    fn to_base64(&self) -> Option<String> {
        serde_json::to_vec(self).ok().map(|json| STANDARD.encode(json))
    }
}

fn marked_map_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"//# sourceMappingSource=(\w+)\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,([A-Za-z0-9+/=]+)")
            .ok()
    })
    .as_ref()
}

fn any_map_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*//[#@] ?sourceMappingURL=data:application/json[^,\n]*;base64,([A-Za-z0-9+/=]+)[ \t]*\r?$")
            .ok()
    })
    .as_ref()
}

fn map_comment_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*//[#@] ?(sourceMappingSource=\w+|sourceMappingURL=data:application/json[^\n]*)\r?\n?")
            .ok()
    })
    .as_ref()
}

fn decode(payload: &str) -> Option<SourceMap> {
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Extract the inline source map embedded in `code`.
///
/// A map behind our own marker comment wins; otherwise the last inline
/// `sourceMappingURL` data comment is used. Returns `None` if there is no
/// inline map or it does not decode.
#[must_use]
pub fn extract_source_map(code: &str) -> Option<SourceMap> {
    let marked = marked_map_regex().and_then(|re| {
        re.captures_iter(code)
            .filter(|caps| &caps[1] == SOURCE_MARKER)
            .last()
    });
    if let Some(caps) = marked {
        return decode(&caps[2]);
    }

    let last = any_map_regex()?.captures_iter(code).last()?;
    decode(&last[1])
}

/// Remove every inline source map comment from `code`.
#[must_use]
pub fn strip_inline_source_maps(code: &str) -> String {
    match map_comment_regex() {
        Some(re) => re.replace_all(code, "").into_owned(),
        None => code.to_string(),
    }
}

/// Replace any inline maps in `code` with `map`, behind our marker comment.
#[must_use]
pub fn with_inline_source_map(code: &str, map: &SourceMap) -> String {
    let stripped = strip_inline_source_maps(code);
    let Some(encoded) = map.to_base64() else {
        return stripped;
    };
    format!(
        "{}\n\n//# sourceMappingSource={SOURCE_MARKER}\n{MAPPING_URL_PREFIX}{encoded}\n",
        stripped.trim_end()
    )
}

/// Rewrite absolute sources in `map` relative to the directory of
/// `module_path`.
///
/// A source starting with `/` that is not inside `root` is treated as
/// root-relative (the form dev servers emit) before being made relative.
/// Relative and empty sources are left alone.
pub fn normalize_sources(map: &mut SourceMap, module_path: &Path, root: &Path) {
    let module_dir = normalize(module_path.parent().unwrap_or(Path::new("/")));

    for source in &mut map.sources {
        if source.is_empty() {
            continue;
        }
        let candidate = Path::new(source.as_str());
        if !candidate.is_absolute() && !source.starts_with('/') {
            continue;
        }

        let actual = if source.starts_with('/') && !is_within(candidate, root) {
            let rooted = root.join(source.trim_start_matches('/'));
            if rooted.exists() || !candidate.exists() {
                normalize(&rooted)
            } else {
                normalize(candidate)
            }
        } else {
            normalize(candidate)
        };

        let relative = pathdiff::diff_paths(&actual, &module_dir).unwrap_or(actual);
        *source = slash(&relative.to_string_lossy());
    }
}
