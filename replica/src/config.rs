use std::{env, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use comms::RetryPolicy;

use crate::error::ConfigErr;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_INITIAL_MODEL: &str = "deepseek-ai/DeepSeek-R1-Distill-Qwen-1.5B";
const DEFAULT_SYNC_INTERVAL_MS: u64 = 2000;
const DEFAULT_LOAD_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_LOAD_BACKOFF_MS: u64 = 2000;
const DEFAULT_LOAD_BACKOFF_MAX_MS: u64 = 10_000;
const DEFAULT_SIM_LOAD_DELAY_MS: u64 = 1500;

/// Everything a replica process is configured with.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaConfig {
    pub host: String,
    pub port: u16,
    pub initial_model: String,
    /// Enables file-based sync when set.
    pub sync_state_file: Option<PathBuf>,
    pub sync_interval: Duration,
    pub sync_republish: bool,
    pub load_retry: RetryPolicy,
    pub sim_load_delay: Duration,
}

impl ReplicaConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigErr> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, empty values count as unset.
    ///
    /// # Arguments
    /// * `lookup` - Resolves a variable name to its value.
    ///
    /// # Returns
    /// The configuration, or a `ConfigErr` naming the first invalid variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigErr>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let attempts: u32 = parse(&get, "LOAD_MAX_ATTEMPTS", DEFAULT_LOAD_MAX_ATTEMPTS)?;
        let max_attempts = NonZeroU32::new(attempts).ok_or_else(|| ConfigErr {
            var: "LOAD_MAX_ATTEMPTS",
            value: attempts.to_string(),
            reason: "must be at least 1".into(),
        })?;

        let load_retry = RetryPolicy::new(
            max_attempts,
            Duration::from_millis(parse(&get, "LOAD_BACKOFF_MS", DEFAULT_LOAD_BACKOFF_MS)?),
            Duration::from_millis(parse(&get, "LOAD_BACKOFF_MAX_MS", DEFAULT_LOAD_BACKOFF_MAX_MS)?),
        );

        let sync_interval_ms: u64 = parse(&get, "SYNC_INTERVAL_MS", DEFAULT_SYNC_INTERVAL_MS)?;
        if sync_interval_ms == 0 {
            return Err(ConfigErr {
                var: "SYNC_INTERVAL_MS",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse(&get, "PORT", DEFAULT_PORT)?,
            initial_model: get("INITIAL_MODEL_REPO_ID")
                .unwrap_or_else(|| DEFAULT_INITIAL_MODEL.to_string()),
            sync_state_file: get("SYNC_STATE_FILE").map(PathBuf::from),
            sync_interval: Duration::from_millis(sync_interval_ms),
            sync_republish: parse_bool(&get, "SYNC_REPUBLISH")?,
            load_retry,
            sim_load_delay: Duration::from_millis(parse(
                &get,
                "SIM_LOAD_DELAY_MS",
                DEFAULT_SIM_LOAD_DELAY_MS,
            )?),
        })
    }

    /// The address the HTTP server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigErr>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigErr {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_bool<G>(get: &G, var: &'static str) -> Result<bool, ConfigErr>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(value) => Err(ConfigErr {
            var,
            value,
            reason: "expected a boolean".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ReplicaConfig, ConfigErr> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ReplicaConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let cfg = config(&[]).unwrap();

        assert_eq!(cfg.bind_addr(), "127.0.0.1:8000");
        assert_eq!(cfg.initial_model, DEFAULT_INITIAL_MODEL);
        assert!(cfg.sync_state_file.is_none());
        assert!(!cfg.sync_republish);
        assert_eq!(cfg.load_retry, RetryPolicy::default());
    }

    #[test]
    fn reads_overrides() {
        let cfg = config(&[
            ("PORT", "8001"),
            ("INITIAL_MODEL_REPO_ID", "org/small"),
            ("SYNC_STATE_FILE", "/shared/desired.json"),
            ("SYNC_INTERVAL_MS", "500"),
            ("SYNC_REPUBLISH", "true"),
            ("LOAD_MAX_ATTEMPTS", "5"),
        ])
        .unwrap();

        assert_eq!(cfg.port, 8001);
        assert_eq!(cfg.initial_model, "org/small");
        assert_eq!(cfg.sync_state_file, Some(PathBuf::from("/shared/desired.json")));
        assert_eq!(cfg.sync_interval, Duration::from_millis(500));
        assert!(cfg.sync_republish);
        assert_eq!(cfg.load_retry.max_attempts(), 5);
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let cfg = config(&[("SYNC_STATE_FILE", ""), ("PORT", " ")]).unwrap();

        assert!(cfg.sync_state_file.is_none());
        assert_eq!(cfg.port, DEFAULT_PORT);
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(config(&[("PORT", "http")]).unwrap_err().var, "PORT");
        assert_eq!(
            config(&[("LOAD_MAX_ATTEMPTS", "0")]).unwrap_err().var,
            "LOAD_MAX_ATTEMPTS"
        );
        assert_eq!(config(&[("SYNC_REPUBLISH", "maybe")]).unwrap_err().var, "SYNC_REPUBLISH");
        assert_eq!(config(&[("SYNC_INTERVAL_MS", "0")]).unwrap_err().var, "SYNC_INTERVAL_MS");
    }
}
