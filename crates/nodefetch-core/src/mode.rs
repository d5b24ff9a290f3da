//! Execution modes.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where fetched code is going to run.
///
/// Every cache lookup and transform is tagged with a mode. Results produced
/// for one mode are never served for the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Server-side execution (`ssr`).
    #[serde(alias = "ssr")]
    Server,
    /// Browser-like execution (`web`).
    #[serde(alias = "web")]
    Client,
}

impl ExecutionMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" | "ssr" => Ok(Self::Server),
            "client" | "web" => Ok(Self::Client),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("ssr".parse::<ExecutionMode>().unwrap(), ExecutionMode::Server);
        assert_eq!("Web".parse::<ExecutionMode>().unwrap(), ExecutionMode::Client);
        assert!("edge".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn test_serde_accepts_aliases() {
        let mode: ExecutionMode = serde_json::from_str("\"web\"").unwrap();
        assert_eq!(mode, ExecutionMode::Client);
        assert_eq!(serde_json::to_string(&mode).unwrap(), "\"client\"");
    }
}
