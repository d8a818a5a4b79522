pub mod client;
mod error;
pub mod msg;
pub mod retry;
pub mod specs;
pub mod store;

pub use client::{GenerateReply, ReplicaClient};
pub use error::{ClientErr, StoreErr};
pub use msg::{
    ErrorBody, GenerateRequest, GenerateResponse, HealthResponse, MODEL_REPO_ID_HEADER,
    MODEL_VERSION_HEADER, ReadyResponse, StatusResponse, UpdateModelRequest, UpdateModelResponse,
};
pub use retry::RetryPolicy;
pub use specs::DesiredState;
pub use store::DesiredStateStore;
