use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fleet-wide record stating which model every replica should be serving.
///
/// Any party may write it, the last write wins. `version` grows with every
/// publish so a repeated request for the same repository can still be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(alias = "desired_model_repo_id")]
    pub model_repo_id: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl DesiredState {
    /// Creates a new `DesiredState` stamped with the current time.
    ///
    /// # Arguments
    /// * `model_repo_id` - The repository every replica should converge to.
    /// * `version` - The publish counter of this record.
    ///
    /// # Returns
    /// A new `DesiredState` instance.
    pub fn new(model_repo_id: impl Into<String>, version: u64) -> Self {
        Self {
            model_repo_id: model_repo_id.into(),
            version,
            updated_at: Utc::now(),
        }
    }

    /// Returns the pair that identifies one publish of this record.
    pub fn key(&self) -> (&str, u64) {
        (&self.model_repo_id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_updated_at_as_rfc3339() {
        let state = DesiredState::new("org/model", 3);
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["model_repo_id"], "org/model");
        assert_eq!(json["version"], 3);
        let stamp = json["updated_at"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[test]
    fn accepts_legacy_record_layout() {
        let raw = r#"{"desired_model_repo_id":"org/legacy","timestamp":1700000000.5}"#;
        let state: DesiredState = serde_json::from_str(raw).unwrap();

        assert_eq!(state.model_repo_id, "org/legacy");
        assert_eq!(state.version, 0);
    }
}
