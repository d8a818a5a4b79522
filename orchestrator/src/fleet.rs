//! Fan-out operations over every replica of the fleet.

use std::time::Duration;

use comms::{
    ClientErr, DesiredState, DesiredStateStore, GenerateReply, GenerateRequest, ReplicaClient,
    RetryPolicy, UpdateModelResponse,
};
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::time::{self, Instant};

use crate::{
    OrchestratorError,
    configs::FleetConfig,
    report::{ConvergenceReport, ReplicaOutcome, ReplicaView},
};

/// Result of sending one prompt to one replica.
#[derive(Debug)]
pub struct ReplicaReply {
    pub url: String,
    pub result: Result<GenerateReply, ClientErr>,
}

/// Result of asking one replica to swap its model.
#[derive(Debug)]
pub struct ReplicaUpdate {
    pub url: String,
    pub result: Result<UpdateModelResponse, ClientErr>,
}

impl ReplicaUpdate {
    /// Whether the replica accepted the update. Acceptance is not completion.
    pub fn accepted(&self) -> bool {
        matches!(&self.result, Ok(res) if res.success)
    }
}

/// How an update reached the fleet.
#[derive(Debug)]
pub enum UpdateDispatch {
    /// Every replica was called, one result each.
    Direct(Vec<ReplicaUpdate>),
    /// A single record was written, replicas pick it up on their next poll.
    SharedState(DesiredState),
}

impl UpdateDispatch {
    /// Direct updates that were not accepted, empty for a shared state publish.
    pub fn rejected(&self) -> Vec<&ReplicaUpdate> {
        match self {
            Self::Direct(updates) => updates.iter().filter(|u| !u.accepted()).collect(),
            Self::SharedState(_) => Vec::new(),
        }
    }
}

/// The set of replicas the orchestrator drives.
pub struct Fleet {
    replicas: Vec<ReplicaClient>,
    store: Option<DesiredStateStore>,
    retry: RetryPolicy,
}

impl Fleet {
    /// Creates a new `Fleet` that updates replicas by calling them directly.
    ///
    /// # Arguments
    /// * `replicas` - One client per replica.
    ///
    /// # Returns
    /// A new `Fleet` instance.
    pub fn new(replicas: Vec<ReplicaClient>) -> Self {
        Self {
            replicas,
            store: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Builds the fleet described by `config`.
    ///
    /// # Errors
    /// Returns an `OrchestratorError::Client` if a client cannot be built.
    pub fn from_config(config: &FleetConfig) -> Result<Self, OrchestratorError> {
        let replicas = config
            .inference_urls
            .iter()
            .map(|url| {
                ReplicaClient::new(url, config.request_timeout).map_err(|source| {
                    OrchestratorError::Client {
                        url: url.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let fleet = Self::new(replicas);
        Ok(match &config.sync_state_file {
            Some(path) => fleet.with_shared_state(DesiredStateStore::new(path)),
            None => fleet,
        })
    }

    /// Publishes updates to `store` instead of calling each replica.
    pub fn with_shared_state(mut self, store: DesiredStateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the retry policy used for direct update calls.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Sends `prompt` to every replica concurrently.
    ///
    /// # Arguments
    /// * `prompt` - The prompt sent with default generation parameters.
    ///
    /// # Returns
    /// One reply per replica, in fleet order.
    pub async fn send_to_all(&self, prompt: &str) -> Vec<ReplicaReply> {
        let req = GenerateRequest::new(prompt);

        let calls = self.replicas.iter().map(|replica| {
            let req = &req;
            async move {
                let result = replica.generate(req).await;
                if let Err(e) = &result {
                    warn!(url = replica.base_url(); "generate failed: {e}");
                }
                ReplicaReply {
                    url: replica.base_url().to_string(),
                    result,
                }
            }
        });

        join_all(calls).await
    }

    /// Asks the fleet to swap to `model_repo_id`.
    ///
    /// With a shared state store a single record is published. Otherwise every
    /// replica is called concurrently, transient transport failures are retried
    /// and a failing replica never prevents the others from being updated.
    ///
    /// # Errors
    /// Returns an `OrchestratorError` if the id is blank or the record cannot be written.
    pub async fn update_all(&self, model_repo_id: &str) -> Result<UpdateDispatch, OrchestratorError> {
        let model_repo_id = model_repo_id.trim();
        if model_repo_id.is_empty() {
            return Err(OrchestratorError::InvalidRepoId);
        }

        if let Some(store) = &self.store {
            let state = store.publish(model_repo_id).await?;
            info!(
                repo_id = model_repo_id,
                version = state.version;
                "published desired state to {}",
                store.path().display()
            );
            return Ok(UpdateDispatch::SharedState(state));
        }

        let calls = self.replicas.iter().map(|replica| async move {
            let what = format!("update of {}", replica.base_url());
            let result = self
                .retry
                .run(&what, ClientErr::is_transient, || replica.update_model(model_repo_id))
                .await;

            match &result {
                Ok(res) if res.success => {
                    info!(url = replica.base_url(), repo_id = model_repo_id; "update accepted")
                }
                Ok(res) => warn!(url = replica.base_url(); "update rejected: {}", res.message),
                Err(e) => warn!(url = replica.base_url(); "update request failed: {e}"),
            }

            ReplicaUpdate {
                url: replica.base_url().to_string(),
                result,
            }
        });

        Ok(UpdateDispatch::Direct(join_all(calls).await))
    }

    /// Fetches every replica's status once, concurrently.
    ///
    /// # Returns
    /// One view or error per replica, in fleet order.
    pub async fn check_all_status(&self) -> Vec<(String, Result<ReplicaView, ClientErr>)> {
        let calls = self.replicas.iter().map(|replica| async move {
            let url = replica.base_url();
            let view = replica
                .status()
                .await
                .map(|status| ReplicaView::new(url, status));
            (url.to_string(), view)
        });

        join_all(calls).await
    }

    /// Polls every replica until all are idle on `expected_repo_id` or `timeout` elapses.
    ///
    /// Unreachable or diverged replicas are polled again on every round, a
    /// replica only counts as failed in the final report.
    ///
    /// # Arguments
    /// * `expected_repo_id` - The model every replica should end up serving.
    /// * `timeout` - Total time budget.
    /// * `interval` - Pause between polling rounds.
    ///
    /// # Returns
    /// The report built from the last polling round.
    pub async fn poll_until_converged(
        &self,
        expected_repo_id: &str,
        timeout: Duration,
        interval: Duration,
    ) -> ConvergenceReport {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut round = 0u32;

        loop {
            round += 1;
            let outcomes = self.observe(expected_repo_id).await;
            let report = ConvergenceReport {
                expected_repo_id: expected_repo_id.to_string(),
                elapsed: start.elapsed(),
                outcomes,
            };

            if report.is_converged() {
                info!(
                    repo_id = expected_repo_id,
                    rounds = round;
                    "fleet converged in {:.1}s",
                    report.elapsed.as_secs_f64()
                );
                return report;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    repo_id = expected_repo_id;
                    "fleet did not converge within {timeout:?}, {} replica(s) failed",
                    report.failed().len()
                );
                return report;
            }

            debug!(
                repo_id = expected_repo_id,
                round = round;
                "{}/{} replica(s) converged",
                report.matched().len(),
                report.outcomes.len()
            );
            time::sleep(interval.min(deadline - now)).await;
        }
    }

    /// One-shot check that every replica is reachable and serving `expected_repo_id`.
    pub async fn verify_synchronization(&self, expected_repo_id: &str) -> bool {
        self.check_all_status()
            .await
            .into_iter()
            .all(|(_, view)| matches!(view, Ok(v) if v.ready && v.model_repo_id == expected_repo_id))
    }

    async fn observe(&self, expected_repo_id: &str) -> Vec<ReplicaOutcome> {
        self.check_all_status()
            .await
            .into_iter()
            .map(|(url, view)| match view {
                Ok(view) => ReplicaOutcome::classify(expected_repo_id, view),
                Err(e) => ReplicaOutcome::Unreachable {
                    url,
                    error: e.to_string(),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn unreachable_fleet() -> Fleet {
        // Nothing listens on port 9 of the loopback interface.
        let client = ReplicaClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        Fleet::new(vec![client]).with_retry(RetryPolicy::once())
    }

    #[tokio::test]
    async fn blank_repo_id_is_rejected_before_any_call() {
        let fleet = unreachable_fleet();

        assert!(matches!(
            fleet.update_all("  ").await,
            Err(OrchestratorError::InvalidRepoId)
        ));
    }

    #[tokio::test]
    async fn shared_state_update_publishes_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = DesiredStateStore::new(dir.path().join("desired.json"));
        let fleet = unreachable_fleet().with_shared_state(store.clone());

        let dispatch = fleet.update_all("org/b").await.unwrap();

        let UpdateDispatch::SharedState(state) = dispatch else {
            panic!("expected a shared state publish");
        };
        assert_eq!(state.model_repo_id, "org/b");
        assert_eq!(state.version, 1);
        assert_eq!(store.read().await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn unreachable_replica_is_reported_not_raised() {
        let fleet = unreachable_fleet();

        let UpdateDispatch::Direct(updates) = fleet.update_all("org/b").await.unwrap() else {
            panic!("expected direct updates");
        };
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].accepted());

        let replies = fleet.send_to_all("hello").await;
        assert!(replies[0].result.is_err());
        assert!(!fleet.verify_synchronization("org/b").await);
    }

    #[tokio::test]
    async fn poll_gives_up_at_timeout() {
        let fleet = unreachable_fleet();

        let report = fleet
            .poll_until_converged("org/b", Duration::from_millis(300), Duration::from_millis(50))
            .await;

        assert!(!report.is_converged());
        assert_eq!(report.unreachable(), ["http://127.0.0.1:9"]);
        assert!(report.elapsed >= Duration::from_millis(300));
    }
}
