//! What the orchestrator observed about each replica.

use std::{fmt, time::Duration};

use comms::StatusResponse;
use serde::Serialize;

/// The last status a replica reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicaView {
    pub url: String,
    pub model_version: u64,
    pub model_repo_id: String,
    pub updating: bool,
    pub ready: bool,
    pub last_update_error: Option<String>,
}

impl ReplicaView {
    pub fn new(url: &str, status: StatusResponse) -> Self {
        Self {
            url: url.to_string(),
            model_version: status.model_version,
            model_repo_id: status.model_repo_id,
            updating: status.updating,
            ready: status.ready,
            last_update_error: status.last_update_error,
        }
    }
}

/// Where a single replica stands relative to the expected model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReplicaOutcome {
    /// Idle on the expected model.
    Converged(ReplicaView),
    /// Still loading a model.
    Updating(ReplicaView),
    /// Idle with no model loaded, its startup load failed.
    NotReady(ReplicaView),
    /// Idle on some other model, usually after a failed load.
    Diverged(ReplicaView),
    /// The status endpoint could not be reached.
    Unreachable { url: String, error: String },
}

impl ReplicaOutcome {
    /// Classifies one status observation against `expected_repo_id`.
    pub fn classify(expected_repo_id: &str, view: ReplicaView) -> Self {
        if view.updating {
            Self::Updating(view)
        } else if !view.ready {
            Self::NotReady(view)
        } else if view.model_repo_id == expected_repo_id {
            Self::Converged(view)
        } else {
            Self::Diverged(view)
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Converged(view) | Self::Updating(view) | Self::NotReady(view) | Self::Diverged(view) => &view.url,
            Self::Unreachable { url, .. } => url,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged(_))
    }
}

impl fmt::Display for ReplicaOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged(v) => write!(f, "{}: converged on {} v{}", v.url, v.model_repo_id, v.model_version),
            Self::Updating(v) => write!(f, "{}: still updating (serving {})", v.url, v.model_repo_id),
            Self::NotReady(v) => match &v.last_update_error {
                Some(e) => write!(f, "{}: not ready, {} failed to load: {e}", v.url, v.model_repo_id),
                None => write!(f, "{}: not ready", v.url),
            },
            Self::Diverged(v) => match &v.last_update_error {
                Some(e) => write!(f, "{}: serving {}, last update failed: {e}", v.url, v.model_repo_id),
                None => write!(f, "{}: serving {}", v.url, v.model_repo_id),
            },
            Self::Unreachable { url, error } => write!(f, "{url}: unreachable: {error}"),
        }
    }
}

/// Outcome of waiting for the fleet to settle on one model.
#[derive(Debug, Clone, Serialize)]
pub struct ConvergenceReport {
    pub expected_repo_id: String,
    pub elapsed: Duration,
    pub outcomes: Vec<ReplicaOutcome>,
}

impl ConvergenceReport {
    /// Whether every replica is idle on the expected model.
    pub fn is_converged(&self) -> bool {
        self.outcomes.iter().all(ReplicaOutcome::is_converged)
    }

    /// Replicas idle on the expected model.
    pub fn matched(&self) -> Vec<&ReplicaView> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ReplicaOutcome::Converged(view) => Some(view),
                _ => None,
            })
            .collect()
    }

    /// Replicas that answered but are not on the expected model yet.
    pub fn diverged(&self) -> Vec<&ReplicaView> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ReplicaOutcome::Updating(view) | ReplicaOutcome::NotReady(view) | ReplicaOutcome::Diverged(view) => {
                    Some(view)
                }
                _ => None,
            })
            .collect()
    }

    /// Every replica that did not converge, reachable or not.
    pub fn failed(&self) -> Vec<&ReplicaOutcome> {
        self.outcomes.iter().filter(|o| !o.is_converged()).collect()
    }

    /// Replicas whose status endpoint could not be reached on the last poll.
    pub fn unreachable(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ReplicaOutcome::Unreachable { .. }))
            .map(ReplicaOutcome::url)
            .collect()
    }
}

impl fmt::Display for ConvergenceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.is_converged() {
            "converged"
        } else {
            "not converged"
        };
        writeln!(
            f,
            "{verdict} on {} after {:.1}s ({}/{} replicas)",
            self.expected_repo_id,
            self.elapsed.as_secs_f64(),
            self.matched().len(),
            self.outcomes.len()
        )?;

        for outcome in &self.outcomes {
            writeln!(f, "  {outcome}")?;
        }
        Ok(())
    }
}
