//! Workflow execution profiles: the tunable knobs each workflow runs under
//!
//! Loaded the same way [`super::server::ServerConfig`] is — a YAML document
//! via [`super::loader::load_yaml_config`] — but scoped to the graph's own
//! behavior rather than transport/security settings.

use crate::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How much the graph is allowed to proceed without stopping for a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Stop at every batch checkpoint regardless of risk.
    Standard,
    /// Skip batch checkpoints for batches made up entirely of low-risk steps.
    Autonomous,
}

/// A named execution profile. Workflows reference a profile by `id`; the
/// profile governs how the graph behaves rather than what it executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,

    #[serde(default = "default_trust_level")]
    pub trust_level: TrustLevel,

    /// Whether `developer_node` ever interrupts for a batch-approval gate.
    /// When `false`, every batch runs back-to-back regardless of trust level
    /// or risk (see `workflow::graph::requires_batch_approval`).
    #[serde(default = "default_true")]
    pub batch_checkpoint_enabled: bool,

    /// How many times the review/fix loop may re-enter the developer node
    /// before the workflow is failed outright.
    #[serde(default = "default_max_review_iterations")]
    pub max_review_iterations: u32,

    /// `{workflow_id}`-templated path the architect's plan is also written to
    /// as a human-readable artifact, independent of the database copy.
    #[serde(default = "default_plan_artifact_path_template")]
    pub plan_artifact_path_template: String,

    #[serde(default = "default_event_retention_days")]
    pub event_retention_days: u32,

    #[serde(default = "default_checkpoint_retention_days")]
    pub checkpoint_retention_days: u32,
}

fn default_trust_level() -> TrustLevel {
    TrustLevel::Standard
}

fn default_true() -> bool {
    true
}

fn default_max_review_iterations() -> u32 {
    3
}

fn default_plan_artifact_path_template() -> String {
    "./.orchestrator/{workflow_id}/plan.json".to_string()
}

fn default_event_retention_days() -> u32 {
    30
}

fn default_checkpoint_retention_days() -> u32 {
    30
}

impl Profile {
    /// A conservative, always-stop-for-approval profile, used when no
    /// profile is configured for a worktree.
    pub fn default_standard() -> Self {
        Self {
            id: "default".to_string(),
            trust_level: TrustLevel::Standard,
            batch_checkpoint_enabled: true,
            max_review_iterations: default_max_review_iterations(),
            plan_artifact_path_template: default_plan_artifact_path_template(),
            event_retention_days: default_event_retention_days(),
            checkpoint_retention_days: default_checkpoint_retention_days(),
        }
    }

    pub fn plan_artifact_path(&self, workflow_id: &str) -> String {
        self.plan_artifact_path_template.replace("{workflow_id}", workflow_id)
    }

    /// Basic sanity checks beyond what serde's defaults already guarantee.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.id.trim().is_empty() {
            return Err(OrchestratorError::Configuration("profile id must not be empty".to_string()));
        }
        if self.max_review_iterations == 0 {
            return Err(OrchestratorError::Configuration(
                "max_review_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load a set of profiles from a YAML file (a top-level list of profile
/// documents), validating each before returning.
pub fn load_profiles<P: AsRef<Path>>(path: P) -> Result<Vec<Profile>, OrchestratorError> {
    let profiles: Vec<Profile> = super::loader::load_yaml_config(path)?;
    for profile in &profiles {
        profile.validate()?;
    }
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_standard_is_conservative() {
        let p = Profile::default_standard();
        assert_eq!(p.trust_level, TrustLevel::Standard);
        assert!(p.batch_checkpoint_enabled);
    }

    #[test]
    fn plan_artifact_path_substitutes_workflow_id() {
        let p = Profile::default_standard();
        assert_eq!(p.plan_artifact_path("wf-42"), "./.orchestrator/wf-42/plan.json");
    }

    #[test]
    fn validate_rejects_empty_id() {
        let mut p = Profile::default_standard();
        p.id = String::new();
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_review_iterations() {
        let mut p = Profile::default_standard();
        p.max_review_iterations = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults_from_partial_yaml() {
        let yaml = "id: fast-track\ntrust_level: autonomous\n";
        let p: Profile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(p.id, "fast-track");
        assert_eq!(p.trust_level, TrustLevel::Autonomous);
        assert!(p.batch_checkpoint_enabled);
        assert_eq!(p.max_review_iterations, 3);
    }
}
