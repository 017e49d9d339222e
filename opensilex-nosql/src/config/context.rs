//! Host-provided context for the MongoDB service.

use serde::{Deserialize, Serialize};
use url::Url;

/// How the hosting application is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Normal operation: connection check and index creation at startup
    #[default]
    Production,
    /// Test harness; no server round trip at startup
    Test,
    /// Reserved profile (install, migration tooling); no server round trip at startup
    Reserved,
}

impl RunMode {
    /// Whether startup should ping the server and create registered indexes.
    pub fn checks_server(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Test => write!(f, "test"),
            Self::Reserved => write!(f, "reserved"),
        }
    }
}

/// Values the service receives from the application hosting it.
///
/// The generation prefix is the base URI under which DAOs mint new model
/// URIs; it is owned by the RDF side of the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceContext {
    /// Current run mode
    #[serde(default)]
    pub run_mode: RunMode,
    /// Base URI for generated model URIs
    pub generation_prefix: Url,
}

impl ServiceContext {
    /// Creates a production context with the given generation prefix.
    pub fn new(generation_prefix: Url) -> Self {
        Self {
            run_mode: RunMode::Production,
            generation_prefix,
        }
    }

    /// Builder method to set the run mode.
    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }
}
