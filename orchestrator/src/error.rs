use std::fmt;

use comms::{ClientErr, StoreErr};

/// All errors that can occur in the orchestrator.
///
/// Per-replica failures during a fleet operation are not errors, they are
/// reported next to the replica they belong to.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before reaching any replica.
    InvalidConfig(String),
    /// An update was requested without a model repository id.
    InvalidRepoId,
    /// A replica client could not be built.
    Client { url: String, source: ClientErr },
    /// The shared desired state record could not be written.
    Store(StoreErr),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::InvalidRepoId => f.write_str("model repo id must not be empty"),
            Self::Client { url, source } => write!(f, "replica client for {url}: {source}"),
            Self::Store(e) => write!(f, "desired state store: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Client { source, .. } => Some(source),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreErr> for OrchestratorError {
    fn from(e: StoreErr) -> Self {
        Self::Store(e)
    }
}
