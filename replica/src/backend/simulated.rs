use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;

use super::{GenerationParams, ModelBackend};
use crate::error::ModelErr;

/// A model produced by the `SimulatedBackend`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedModel {
    pub repo_id: String,
}

#[derive(Debug)]
struct ScriptedFailure {
    err: ModelErr,
    remaining: usize,
}

/// Stand-in backend that keeps the control plane runnable without an inference stack.
///
/// Loads sleep for a fixed latency. Ids not shaped like `owner/name` are not found,
/// and failures can be scripted per id.
#[derive(Debug)]
pub struct SimulatedBackend {
    load_delay: Duration,
    failures: Mutex<HashMap<String, ScriptedFailure>>,
}

impl SimulatedBackend {
    /// Creates a new `SimulatedBackend`.
    ///
    /// # Arguments
    /// * `load_delay` - How long every load takes.
    ///
    /// # Returns
    /// A new `SimulatedBackend` instance.
    pub fn new(load_delay: Duration) -> Self {
        Self {
            load_delay,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Makes the next `times` loads of `repo_id` fail with `err`.
    pub fn fail_loads_times(&self, repo_id: &str, err: ModelErr, times: usize) {
        if times > 0 {
            self.failures
                .lock()
                .insert(repo_id.to_string(), ScriptedFailure { err, remaining: times });
        }
    }

    fn scripted_failure(&self, repo_id: &str) -> Option<ModelErr> {
        let mut failures = self.failures.lock();
        let failure = failures.get_mut(repo_id)?;
        let err = failure.err.clone();

        failure.remaining -= 1;
        if failure.remaining == 0 {
            failures.remove(repo_id);
        }

        Some(err)
    }
}

fn is_repo_id(repo_id: &str) -> bool {
    let mut parts = repo_id.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
    )
}

#[async_trait]
impl ModelBackend for SimulatedBackend {
    type Handle = SimulatedModel;

    async fn load(&self, repo_id: &str) -> Result<SimulatedModel, ModelErr> {
        debug!(repo_id = repo_id; "simulating model load");
        tokio::time::sleep(self.load_delay).await;

        if let Some(err) = self.scripted_failure(repo_id) {
            return Err(err);
        }

        if !is_repo_id(repo_id) {
            return Err(ModelErr::ModelNotFound(repo_id.to_string()));
        }

        Ok(SimulatedModel {
            repo_id: repo_id.to_string(),
        })
    }

    async fn infer(
        &self,
        model: &SimulatedModel,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelErr> {
        let words: Vec<&str> = params
            .system_prompt
            .iter()
            .flat_map(|s| s.split_whitespace())
            .chain(prompt.split_whitespace())
            .take(params.max_new_tokens as usize)
            .collect();

        if words.is_empty() {
            return Err(ModelErr::Generation("prompt has no tokens".into()));
        }

        Ok(format!("[{}] {}", model.repo_id, words.join(" ")))
    }
}
