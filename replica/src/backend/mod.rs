mod simulated;

use async_trait::async_trait;
use comms::GenerateRequest;

use crate::error::{InvalidParams, ModelErr};

pub use simulated::{SimulatedBackend, SimulatedModel};

pub const MAX_NEW_TOKENS_LIMIT: u32 = 2048;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// The opaque engine that turns a repository id into a servable model.
///
/// Both calls may take arbitrarily long; the manager never holds any lock while
/// awaiting them.
#[async_trait]
pub trait ModelBackend: Send + Sync + 'static {
    /// A loaded model, shared read-only by every request it serves.
    type Handle: Send + Sync + 'static;

    /// Loads the model published under `repo_id`.
    async fn load(&self, repo_id: &str) -> Result<Self::Handle, ModelErr>;

    /// Runs one generation on an already loaded model.
    async fn infer(
        &self,
        model: &Self::Handle,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelErr>;
}

/// Validated sampling parameters for a single generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub system_prompt: Option<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: comms::msg::DEFAULT_MAX_NEW_TOKENS,
            temperature: comms::msg::DEFAULT_TEMPERATURE,
            system_prompt: None,
        }
    }
}

impl GenerationParams {
    /// Validates the sampling fields of a `/generate` request.
    ///
    /// # Arguments
    /// * `req` - The incoming request.
    ///
    /// # Returns
    /// The parameters, or `InvalidParams` if the prompt is empty or a field is out of range.
    pub fn from_request(req: &GenerateRequest) -> Result<Self, InvalidParams> {
        if req.prompt.is_empty() {
            return Err(InvalidParams("prompt must not be empty".into()));
        }

        if !(1..=MAX_NEW_TOKENS_LIMIT).contains(&req.max_new_tokens) {
            return Err(InvalidParams(format!(
                "max_new_tokens must be within 1..={MAX_NEW_TOKENS_LIMIT}, got {}",
                req.max_new_tokens
            )));
        }

        if !(0.0..=MAX_TEMPERATURE).contains(&req.temperature) {
            return Err(InvalidParams(format!(
                "temperature must be within 0.0..={MAX_TEMPERATURE}, got {}",
                req.temperature
            )));
        }

        Ok(Self {
            max_new_tokens: req.max_new_tokens,
            temperature: req.temperature,
            system_prompt: req.system_prompt.clone(),
        })
    }
}
