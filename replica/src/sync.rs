//! File-based convergence: every replica polls the shared `DesiredState` record and
//! asks its own manager to catch up.
//!
//! Consistency is weak on purpose. Writers race and the last rename wins, and a
//! replica converges within one poll interval plus its load time.

use std::{sync::Arc, time::Duration};

use comms::{DesiredState, DesiredStateStore};
use log::{debug, info, warn};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{backend::ModelBackend, error::UpdateRejection, manager::ModelManager};

/// Outcome of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Nothing was published yet.
    NoDesiredState,
    /// The record couldn't be read, the next poll tries again.
    ReadFailed,
    /// This publish was already acted upon.
    Unchanged,
    /// The replica already serves the desired model.
    AlreadyConverged,
    /// A load is running, the record is looked at again once it ends.
    Busy,
    /// An update towards the desired model was started.
    Triggered,
    /// The manager refused the desired model for good.
    Rejected(UpdateRejection),
}

/// Watches the shared record on behalf of one replica.
pub struct SyncCoordinator<B: ModelBackend> {
    store: DesiredStateStore,
    manager: Arc<ModelManager<B>>,
    interval: Duration,
    handled: Option<(String, u64)>,
}

impl<B: ModelBackend> SyncCoordinator<B> {
    /// Creates a new `SyncCoordinator`.
    ///
    /// # Arguments
    /// * `store` - Access to the shared record.
    /// * `manager` - This replica's model manager.
    /// * `interval` - Time between two polls.
    ///
    /// # Returns
    /// A new `SyncCoordinator` instance.
    pub fn new(store: DesiredStateStore, manager: Arc<ModelManager<B>>, interval: Duration) -> Self {
        Self {
            store,
            manager,
            interval,
            handled: None,
        }
    }

    /// Reads the record once and reacts to it.
    ///
    /// A publish is handled at most once, identified by its `(repo_id, version)`.
    /// While the manager is busy the publish is left unhandled so a later poll picks it up.
    pub async fn poll_once(&mut self) -> SyncAction {
        let desired = match self.store.read().await {
            Ok(Some(desired)) => desired,
            Ok(None) => return SyncAction::NoDesiredState,
            Err(e) => {
                warn!("failed to read desired state from {}: {e}", self.store.path().display());
                return SyncAction::ReadFailed;
            }
        };

        if self.is_handled(&desired) {
            return SyncAction::Unchanged;
        }

        let status = self.manager.status();
        if status.updating {
            debug!(repo_id = desired.model_repo_id.as_str(); "desired state pending, update in progress");
            return SyncAction::Busy;
        }

        if status.ready && status.repo_id == desired.model_repo_id {
            self.mark_handled(&desired);
            return SyncAction::AlreadyConverged;
        }

        info!(
            repo_id = desired.model_repo_id.as_str(),
            version = desired.version;
            "detected desired model change"
        );

        let res = self.manager.request_update(&desired.model_repo_id);
        match res.error {
            None => {
                self.mark_handled(&desired);
                SyncAction::Triggered
            }
            Some(UpdateRejection::InProgress) => SyncAction::Busy,
            Some(rejection) => {
                warn!(
                    repo_id = desired.model_repo_id.as_str();
                    "desired state rejected: {rejection}"
                );
                self.mark_handled(&desired);
                SyncAction::Rejected(rejection)
            }
        }
    }

    /// Polls until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "watching {} every {:?}",
            self.store.path().display(),
            self.interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let action = self.poll_once().await;
                    debug!("sync poll: {action:?}");
                }
            }
        }

        info!("sync coordinator stopped");
    }

    /// Runs the poll loop on its own task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    fn is_handled(&self, desired: &DesiredState) -> bool {
        self.handled
            .as_ref()
            .is_some_and(|(repo_id, version)| (repo_id.as_str(), *version) == desired.key())
    }

    fn mark_handled(&mut self, desired: &DesiredState) {
        self.handled = Some((desired.model_repo_id.clone(), desired.version));
    }
}
