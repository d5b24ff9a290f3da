//! The host build environment, as seen from the fetch cache.
//!
//! The host owns module resolution, the transform pipeline and the module
//! graph. The cache only calls into it; it never mutates host state.
//!
//! ## Example
//!
//! ```ignore
//! use nodefetch_core::{ExecutionMode, HostError, ModuleHost, PipelineOutput, ResolvedId};
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl ModuleHost for Echo {
//!     async fn resolve_id(&self, specifier: &str, _importer: Option<&str>, _mode: ExecutionMode)
//!         -> Result<Option<ResolvedId>, HostError> {
//!         Ok(Some(ResolvedId::resolved(specifier)))
//!     }
//!
//!     async fn transform(&self, id: &str, _path: &Path, _mode: ExecutionMode)
//!         -> Result<Option<PipelineOutput>, HostError> {
//!         Ok(Some(PipelineOutput::code(format!("export default {id:?};"))))
//!     }
//!
//!     fn freshness_marker(&self, _path: &Path) -> Option<u64> {
//!         Some(0)
//!     }
//! }
//! ```

mod fs;
mod graph;

pub use fs::{FsHost, TransformHook};
pub use graph::{InvalidationKind, ModuleGraph, ModuleNode};

use crate::mode::ExecutionMode;
use crate::source_map::SourceMap;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Result type for host hooks.
pub type HostResult<T> = Result<T, HostError>;

/// Error raised by a host hook.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{hook}] {message}")]
pub struct HostError {
    /// Hook that failed.
    pub hook: &'static str,
    /// Error message.
    pub message: String,
}

impl HostError {
    pub fn new(hook: &'static str, message: impl Into<String>) -> Self {
        Self {
            hook,
            message: message.into(),
        }
    }

    /// Failure in the `resolve_id` hook.
    pub fn resolve(message: impl Into<String>) -> Self {
        Self::new("resolve_id", message)
    }

    /// Failure in the `transform` hook.
    pub fn transform(message: impl Into<String>) -> Self {
        Self::new("transform", message)
    }
}

/// Result of the resolve hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedId {
    /// Resolved module id (usually a file path).
    pub id: String,
    /// Whether the host asks for this module to be imported natively.
    pub external: bool,
}

impl ResolvedId {
    /// Create a resolved module result.
    pub fn resolved(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: false,
        }
    }

    /// Create an external module result.
    pub fn external(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: true,
        }
    }
}

/// Output of the transform pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Transformed code.
    pub code: String,
    /// Source map, if the pipeline produced one outside the code.
    pub map: Option<SourceMap>,
}

impl PipelineOutput {
    /// Create an output with code only.
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
        }
    }

    /// Attach a source map.
    #[must_use]
    pub fn with_map(mut self, map: SourceMap) -> Self {
        self.map = Some(map);
        self
    }
}

/// The host build environment.
#[async_trait]
pub trait ModuleHost: Send + Sync {
    /// Resolve `specifier` imported from `importer`, applying the
    /// resolution conditions of `mode`.
    async fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
        mode: ExecutionMode,
    ) -> HostResult<Option<ResolvedId>>;

    /// Transform the module `id`, located at `path`, for `mode`.
    ///
    /// `Ok(None)` means the host cannot transform this module.
    async fn transform(
        &self,
        id: &str,
        path: &Path,
        mode: ExecutionMode,
    ) -> HostResult<Option<PipelineOutput>>;

    /// Current freshness marker for `path`.
    ///
    /// Non-decreasing; grows whenever the module has to be reconsidered.
    /// `None` if the host graph does not know the path.
    fn freshness_marker(&self, path: &Path) -> Option<u64>;
}
