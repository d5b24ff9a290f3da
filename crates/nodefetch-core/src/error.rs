use crate::host::HostError;
use crate::mode::ExecutionMode;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for configuration and setup.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown execution mode '{0}' (expected server, client, ssr or web)")]
    InvalidMode(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Error returned by a fetch or resolve request.
///
/// `Clone` because one failed transform is delivered to every caller that
/// was waiting on it.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("Failed to resolve '{specifier}': {source}")]
    Resolution {
        specifier: String,
        #[source]
        source: HostError,
    },

    #[error("Failed to transform {} in {mode} mode: {source}", path.display())]
    Transform {
        path: PathBuf,
        mode: ExecutionMode,
        #[source]
        source: HostError,
    },

    #[error("No transform result for {} in {mode} mode", path.display())]
    NotTransformed { path: PathBuf, mode: ExecutionMode },

    #[error("Transform task for {} did not complete: {message}", path.display())]
    TaskFailed { path: PathBuf, message: String },
}

impl FetchError {
    /// The host error behind this failure, if the host produced one.
    #[must_use]
    pub fn host_error(&self) -> Option<&HostError> {
        match self {
            Self::Resolution { source, .. } | Self::Transform { source, .. } => Some(source),
            Self::NotTransformed { .. } | Self::TaskFailed { .. } => None,
        }
    }
}
