//! The per-replica HTTP surface.
//!
//! Routes:
//! - `GET /healthz` - the process is up
//! - `GET /ready` - a model finished loading
//! - `GET /status` - version, repository, update flag and last error
//! - `POST /generate` - inference on the current snapshot
//! - `POST /update-model` - starts a hot swap

mod error;
mod routes;

use std::sync::Arc;

use comms::DesiredStateStore;

use crate::{backend::ModelBackend, manager::ModelManager};

pub use error::ApiError;
pub use routes::router;

/// Shared state handed to every handler.
pub struct ReplicaState<B: ModelBackend> {
    manager: Arc<ModelManager<B>>,
    publisher: Option<DesiredStateStore>,
}

impl<B: ModelBackend> Clone for ReplicaState<B> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            publisher: self.publisher.clone(),
        }
    }
}

impl<B: ModelBackend> ReplicaState<B> {
    /// Creates a new `ReplicaState`.
    ///
    /// # Arguments
    /// * `manager` - This replica's model manager.
    /// * `publisher` - When set, accepted updates are also published to the shared record.
    ///
    /// # Returns
    /// A new `ReplicaState` instance.
    pub fn new(manager: Arc<ModelManager<B>>, publisher: Option<DesiredStateStore>) -> Self {
        Self { manager, publisher }
    }
}
