pub mod backend;
pub mod config;
pub mod error;
pub mod manager;
pub mod service;
pub mod sync;
pub mod version;

pub use backend::{GenerationParams, ModelBackend, SimulatedBackend};
pub use config::ReplicaConfig;
pub use error::{ConfigErr, ModelErr, UpdateRejection};
pub use manager::{Generation, ModelManager, ModelStatus, UpdateResult};
pub use service::{ReplicaState, router};
pub use sync::{SyncAction, SyncCoordinator};
pub use version::VersionTracker;
