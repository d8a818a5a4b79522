//! The JSON bodies exchanged with a replica's HTTP surface.

use serde::{Deserialize, Serialize};

/// Header carrying the version of the model that served a `/generate` call.
pub const MODEL_VERSION_HEADER: &str = "x-model-version";

/// Header carrying the repository id of the model that served a `/generate` call.
pub const MODEL_REPO_ID_HEADER: &str = "x-model-repo-id";

pub const DEFAULT_MAX_NEW_TOKENS: u32 = 50;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

fn default_max_new_tokens() -> u32 {
    DEFAULT_MAX_NEW_TOKENS
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

/// Body of `GET /healthz`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// Body of `GET /ready`, both for the ready and the not ready answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_repo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub model_version: u64,
    pub model_repo_id: String,
    pub updating: bool,
    /// False until a model finished loading, even if `updating` is false.
    pub ready: bool,
    pub last_update_error: Option<String>,
}

/// Body of `POST /generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl GenerateRequest {
    /// Creates a request for `prompt` with the default sampling parameters.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: None,
        }
    }
}

/// Successful body of `POST /generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
}

/// Body of `POST /update-model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateModelRequest {
    pub model_repo_id: String,
}

/// Answer of `POST /update-model`.
///
/// `success` tells whether the update was accepted, not whether the load completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateModelResponse {
    pub success: bool,
    pub requested_model_repo_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error body returned by a replica, `kind` is a stable snake_case discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub detail: String,
}
