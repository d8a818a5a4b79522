use std::{error::Error, fmt};

/// Failures reported by the model backend or by the manager in front of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelErr {
    /// The identifier can't be resolved by the backend.
    ModelNotFound(String),
    /// The backend can't allocate what the model needs.
    ResourceExhausted(String),
    /// Transient failure reaching the model source, worth retrying.
    Network(String),
    /// Inference failed on a loaded model.
    Generation(String),
    /// No model finished loading yet.
    NotReady,
}

impl ModelErr {
    /// Stable discriminant used in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelNotFound(_) => "model_not_found",
            Self::ResourceExhausted(_) => "resource_exhausted",
            Self::Network(_) => "network",
            Self::Generation(_) => "generation",
            Self::NotReady => "not_ready",
        }
    }

    /// Only network failures are retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl fmt::Display for ModelErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelNotFound(id) => write!(f, "model not found: {id}"),
            Self::ResourceExhausted(msg) => write!(f, "resource exhausted: {msg}"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Generation(msg) => write!(f, "generation failed: {msg}"),
            Self::NotReady => f.write_str("model is not loaded yet"),
        }
    }
}

impl Error for ModelErr {}

/// Why a `request_update` call was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateRejection {
    /// Another load holds the update guard.
    InProgress,
    /// The requested identifier is empty or not visible ASCII.
    InvalidRepoId,
    /// `spawn_initial_load` after a model is already served.
    AlreadyLoaded,
}

impl UpdateRejection {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InProgress => "update_in_progress",
            Self::InvalidRepoId => "invalid_request",
            Self::AlreadyLoaded => "already_loaded",
        }
    }
}

impl fmt::Display for UpdateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => f.write_str("update already in progress"),
            Self::InvalidRepoId => f.write_str("model repo id must be non-empty visible ASCII"),
            Self::AlreadyLoaded => f.write_str("initial model already loaded"),
        }
    }
}

impl Error for UpdateRejection {}

/// Sampling parameters outside of their accepted range.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidParams(pub String);

impl fmt::Display for InvalidParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid generation parameters: {}", self.0)
    }
}

impl Error for InvalidParams {}

/// An environment variable holding a value that can't be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigErr {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}={:?}: {}", self.var, self.value, self.reason)
    }
}

impl Error for ConfigErr {}
