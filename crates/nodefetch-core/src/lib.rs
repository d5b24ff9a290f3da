#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Module fetch cache for server-side and browser-like execution.
//!
//! Given a module id and an [`ExecutionMode`], [`ModuleFetcher`] returns
//! transformed source plus a source map, or a directive to import the module
//! natively. Results are cached per mode and revalidated on every access
//! against the freshness marker the host's module graph reports.

pub mod config;
pub mod error;
pub mod externalize;
pub mod fetch;
pub mod host;
pub mod ids;
pub mod mode;
pub mod paths;
pub mod source_map;
pub mod version;

pub use config::{DepsOptions, FetchOptions, InlineDeps, Pattern, TransformModeRules};
pub use error::{Error, FetchError};
pub use externalize::should_externalize;
pub use fetch::{FetchResult, LedgerEntry, ModuleFetcher};
pub use host::{FsHost, HostError, ModuleGraph, ModuleHost, PipelineOutput, ResolvedId};
pub use mode::ExecutionMode;
pub use source_map::{extract_source_map, with_inline_source_map, SourceMap};
pub use version::VERSION;
