use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::OrchestratorError;

const DEFAULT_INFERENCE_URLS: &str = "http://localhost:8001,http://localhost:8002";
const DEFAULT_INITIAL_MODEL: &str = "deepseek-ai/DeepSeek-R1-Distill-Qwen-1.5B";
const DEFAULT_SUBSTITUTE_MODEL: &str = "Qwen/Qwen2.5-7B-Instruct";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_CONVERGENCE_TIMEOUT_SECS: u64 = 600;
const DEFAULT_NUM_PROMPTS: usize = 3;

/// How the orchestrator reaches the fleet and drives the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetConfig {
    pub inference_urls: Vec<String>,
    pub initial_model: String,
    pub substitute_model: String,
    /// When set, updates are published here instead of being sent to each replica.
    pub sync_state_file: Option<PathBuf>,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub convergence_timeout: Duration,
    pub num_prompts: usize,
}

impl FleetConfig {
    /// Reads the configuration from the environment, the first command line
    /// argument overrides `INFERENCE_URLS`.
    pub fn from_env() -> Result<Self, OrchestratorError> {
        let urls = env::args().nth(1);
        Self::from_lookup(|var| env::var(var).ok(), urls.as_deref())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Arguments
    /// * `lookup` - Resolves a variable name to its value, empty values count as unset.
    /// * `urls_override` - Comma separated replica list taking precedence over `INFERENCE_URLS`.
    ///
    /// # Returns
    /// The configuration, or `OrchestratorError::InvalidConfig`.
    pub fn from_lookup<F>(lookup: F, urls_override: Option<&str>) -> Result<Self, OrchestratorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let urls = urls_override
            .map(str::to_string)
            .or_else(|| get("INFERENCE_URLS"))
            .unwrap_or_else(|| DEFAULT_INFERENCE_URLS.to_string());
        let inference_urls = split_urls(&urls);
        if inference_urls.is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "at least one inference url is required".into(),
            ));
        }

        let num_prompts = parse(&get, "NUM_PROMPTS", DEFAULT_NUM_PROMPTS)?;
        let secs = |var: &str, default: u64| parse(&get, var, default).map(Duration::from_secs);

        let poll_interval = secs("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_interval.is_zero() {
            return Err(OrchestratorError::InvalidConfig(
                "POLL_INTERVAL_SECS must be positive".into(),
            ));
        }

        Ok(Self {
            inference_urls,
            initial_model: get("INITIAL_MODEL").unwrap_or_else(|| DEFAULT_INITIAL_MODEL.into()),
            substitute_model: get("SUBSTITUTE_MODEL")
                .unwrap_or_else(|| DEFAULT_SUBSTITUTE_MODEL.into()),
            sync_state_file: get("SYNC_STATE_FILE").map(PathBuf::from),
            request_timeout: secs("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            poll_interval,
            convergence_timeout: secs("CONVERGENCE_TIMEOUT_SECS", DEFAULT_CONVERGENCE_TIMEOUT_SECS)?,
            num_prompts,
        })
    }
}

fn split_urls(urls: &str) -> Vec<String> {
    urls.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse<T, G>(get: &G, var: &str, default: T) -> Result<T, OrchestratorError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| OrchestratorError::InvalidConfig(format!("{var}={value:?}: {e}"))),
    }
}
