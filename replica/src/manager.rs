//! The single source of truth for which model a replica serves.
//!
//! The live `ModelState` is an immutable snapshot behind an `ArcSwap`: readers grab
//! the whole snapshot without locking and keep serving from it even if a swap lands
//! meanwhile. Writes happen only inside the background task that owns the update
//! guard, so at most one load is in flight and commits are totally ordered.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use arc_swap::ArcSwap;
use comms::RetryPolicy;
use futures::FutureExt;
use log::{error, info, warn};
use tokio::task::JoinHandle;

use crate::{
    backend::{GenerationParams, ModelBackend},
    error::{ModelErr, UpdateRejection},
    version::VersionTracker,
};

/// One committed state of the replica.
struct ModelState<H> {
    repo_id: String,
    version: u64,
    last_error: Option<String>,
    handle: Option<Arc<H>>,
}

impl<H> Clone for ModelState<H> {
    fn clone(&self) -> Self {
        Self {
            repo_id: self.repo_id.clone(),
            version: self.version,
            last_error: self.last_error.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<H> ModelState<H> {
    fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }
}

/// What `/status` reports, the handle left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStatus {
    pub repo_id: String,
    pub version: u64,
    pub updating: bool,
    pub ready: bool,
    pub last_error: Option<String>,
}

/// A generated text and the snapshot that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub repo_id: String,
    pub version: u64,
}

/// Answer to `request_update`: whether the update was accepted, not whether it completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    pub success: bool,
    pub requested_repo_id: String,
    pub message: String,
    pub error: Option<UpdateRejection>,
}

impl UpdateResult {
    fn accepted(repo_id: &str) -> Self {
        Self {
            success: true,
            requested_repo_id: repo_id.to_string(),
            message: "update started".into(),
            error: None,
        }
    }

    fn rejected(repo_id: &str, rejection: UpdateRejection) -> Self {
        Self {
            success: false,
            requested_repo_id: repo_id.to_string(),
            message: rejection.to_string(),
            error: Some(rejection),
        }
    }
}

/// Ownership of the update slot, released on drop whatever way the load ends.
struct UpdateGuard(Arc<AtomicBool>);

impl UpdateGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Mediates every read and write of the replica's active model.
pub struct ModelManager<B: ModelBackend> {
    backend: B,
    state: ArcSwap<ModelState<B::Handle>>,
    updating: Arc<AtomicBool>,
    tracker: VersionTracker,
    retry: RetryPolicy,
}

impl<B: ModelBackend> ModelManager<B> {
    /// Creates a new `ModelManager` with nothing loaded yet.
    ///
    /// The manager reports `initial_repo_id` at `VersionTracker::INITIAL` but isn't
    /// ready until `spawn_initial_load` completes.
    ///
    /// # Arguments
    /// * `backend` - The engine loading and running models.
    /// * `initial_repo_id` - The model to serve at startup.
    /// * `retry` - Retry policy for transient load failures.
    ///
    /// # Returns
    /// A shared `ModelManager` instance.
    pub fn new(backend: B, initial_repo_id: &str, retry: RetryPolicy) -> Arc<Self> {
        let tracker = VersionTracker::new();
        let state = ModelState {
            repo_id: initial_repo_id.to_string(),
            version: tracker.current(),
            last_error: None,
            handle: None,
        };

        Arc::new(Self {
            backend,
            state: ArcSwap::from_pointee(state),
            updating: Arc::new(AtomicBool::new(false)),
            tracker,
            retry,
        })
    }

    /// Returns a consistent view of the current state.
    ///
    /// Never blocks on an in-flight load.
    pub fn status(&self) -> ModelStatus {
        // The flag is read first: once it reads false, the commit that preceded its
        // release is visible in the snapshot loaded below.
        let updating = self.updating.load(Ordering::Acquire);
        let state = self.state.load();

        ModelStatus {
            repo_id: state.repo_id.clone(),
            version: state.version,
            updating,
            ready: state.is_loaded(),
            last_error: state.last_error.clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.load().is_loaded()
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    /// Runs a generation on the snapshot current at call time.
    ///
    /// A swap committed while this call is running doesn't affect it.
    ///
    /// # Arguments
    /// * `prompt` - The user prompt.
    /// * `params` - Validated sampling parameters.
    ///
    /// # Returns
    /// The text and the `(repo_id, version)` of the model that produced it, or
    /// `ModelErr::NotReady` before the first successful load.
    pub async fn infer(&self, prompt: &str, params: &GenerationParams) -> Result<Generation, ModelErr> {
        let state = self.state.load_full();
        let handle = state.handle.clone().ok_or(ModelErr::NotReady)?;

        let text = self.backend.infer(&handle, prompt, params).await?;

        Ok(Generation {
            text,
            repo_id: state.repo_id.clone(),
            version: state.version,
        })
    }

    /// Starts loading the initial model in the background.
    ///
    /// The load holds the update guard, so `status.updating` is true meanwhile and
    /// competing updates are rejected.
    ///
    /// # Returns
    /// The handle of the background load, `UpdateRejection::InProgress` if a
    /// load is already running, or `UpdateRejection::AlreadyLoaded` once a model
    /// is being served. Only a failed initial load can be retried.
    pub fn spawn_initial_load(self: &Arc<Self>) -> Result<JoinHandle<()>, UpdateRejection> {
        let guard = UpdateGuard::try_acquire(&self.updating).ok_or(UpdateRejection::InProgress)?;
        // Checked under the guard so a concurrent update can't commit in between.
        if self.state.load().is_loaded() {
            return Err(UpdateRejection::AlreadyLoaded);
        }
        let manager = Arc::clone(self);

        Ok(tokio::spawn(async move {
            let _guard = guard;
            let repo_id = manager.state.load().repo_id.clone();
            info!(repo_id = repo_id.as_str(); "starting initial model load");

            match manager.load(&repo_id).await {
                Ok(handle) => {
                    let state = ModelState {
                        repo_id,
                        version: manager.tracker.current(),
                        last_error: None,
                        handle: Some(Arc::new(handle)),
                    };
                    info!(
                        repo_id = state.repo_id.as_str(),
                        version = state.version;
                        "initial model load completed"
                    );
                    manager.state.store(Arc::new(state));
                }
                Err(e) => {
                    error!(repo_id = repo_id.as_str(); "initial model load failed: {e}");
                    manager.record_failure(format!("initial model load failed: {e}"));
                }
            }
        }))
    }

    /// Requests a hot swap to `repo_id`.
    ///
    /// Returns as soon as the update is accepted or rejected, the load itself
    /// runs in the background.
    ///
    /// # Arguments
    /// * `repo_id` - The model to swap in.
    ///
    /// # Returns
    /// An `UpdateResult` stating whether the update was accepted.
    pub fn request_update(self: &Arc<Self>, repo_id: &str) -> UpdateResult {
        let repo_id = repo_id.trim();
        match self.try_begin_update(repo_id) {
            Ok(_) => UpdateResult::accepted(repo_id),
            Err(rejection) => UpdateResult::rejected(repo_id, rejection),
        }
    }

    /// Same as `request_update`, handing back the background load on acceptance.
    ///
    /// # Arguments
    /// * `repo_id` - The model to swap in.
    ///
    /// # Returns
    /// The background load's handle, or why the update was rejected.
    pub fn try_begin_update(self: &Arc<Self>, repo_id: &str) -> Result<JoinHandle<()>, UpdateRejection> {
        let repo_id = repo_id.trim();
        if !is_valid_repo_id(repo_id) {
            warn!("update rejected, invalid repo id {repo_id:?}");
            return Err(UpdateRejection::InvalidRepoId);
        }

        let Some(guard) = UpdateGuard::try_acquire(&self.updating) else {
            warn!(repo_id = repo_id; "update rejected, another update is in progress");
            return Err(UpdateRejection::InProgress);
        };

        info!(repo_id = repo_id; "update accepted");
        let manager = Arc::clone(self);
        let repo_id = repo_id.to_string();

        Ok(tokio::spawn(async move {
            let _guard = guard;

            match manager.load(&repo_id).await {
                Ok(handle) => manager.commit(repo_id, handle),
                Err(e) => {
                    warn!(repo_id = repo_id.as_str(); "model load failed, keeping current model: {e}");
                    manager.record_failure(e.to_string());
                }
            }
        }))
    }

    /// Loads `repo_id` through the retry policy, turning a backend panic into an error.
    async fn load(&self, repo_id: &str) -> Result<B::Handle, ModelErr> {
        let what = format!("loading {repo_id}");
        let attempt = self
            .retry
            .run(&what, ModelErr::is_transient, || self.backend.load(repo_id));

        match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(res) => res,
            Err(_) => Err(ModelErr::ResourceExhausted(format!(
                "backend panicked while loading {repo_id}"
            ))),
        }
    }

    /// Publishes a freshly loaded model as the next version.
    fn commit(&self, repo_id: String, handle: B::Handle) {
        let previous = self.state.load_full();
        let version = self.tracker.advance();

        self.state.store(Arc::new(ModelState {
            repo_id,
            version,
            last_error: None,
            handle: Some(Arc::new(handle)),
        }));

        info!(
            previous_repo_id = previous.repo_id.as_str(),
            previous_version = previous.version,
            version = version;
            "model swapped"
        );
    }

    /// Keeps the committed model and records why the last load failed.
    fn record_failure(&self, message: String) {
        let mut state = ModelState::clone(&self.state.load());
        state.last_error = Some(message);
        self.state.store(Arc::new(state));
    }
}

/// Non-empty and made of visible ASCII, so it always fits in a response header.
fn is_valid_repo_id(repo_id: &str) -> bool {
    !repo_id.is_empty() && repo_id.bytes().all(|b| b.is_ascii_graphic() || b == b' ')
}
