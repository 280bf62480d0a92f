//! In-flight execution state threaded through the workflow graph
//!
//! This is the single piece of state every node in [`crate::workflow::graph`]
//! reads and writes, and the piece of state that gets serialized into the
//! workflow row's `state_json` column after every stage (see
//! [`crate::db::repositories::WorkflowRepository::save_state`]).

use super::model::{
    BatchApproval, BatchResult, BlockerReport, BlockerResolution, ExecutionPlan, GitSnapshotBeforeBatch,
    ReviewResult,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name of the node the graph is currently on, or about to resume into.
/// Kept as a plain string (rather than a closed enum) so that adding a node
/// doesn't require touching every place that stores a stage name.
pub type StageName = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub issue: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,
    pub current_stage: StageName,
    #[serde(default)]
    pub current_batch_index: usize,
    #[serde(default)]
    pub skipped_step_ids: HashSet<String>,
    #[serde(default)]
    pub batch_results: Vec<BatchResult>,
    /// Append-only log of human batch-approval decisions. Invariant: an
    /// entry's `batch_index` only ever names a batch that actually executed.
    #[serde(default)]
    pub batch_approvals: Vec<BatchApproval>,
    #[serde(default)]
    pub review_results: Vec<ReviewResult>,
    #[serde(default)]
    pub review_iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocker: Option<BlockerReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_batch_snapshot: Option<GitSnapshotBeforeBatch>,
    #[serde(default)]
    pub human_approved: bool,
    /// Free-form instructions accumulated from blocker resolutions, fed back
    /// into the developer node's context on resume.
    #[serde(default)]
    pub pending_instructions: Vec<String>,
    /// Set by the service layer from an incoming blocker-resolution request,
    /// consumed by `blocker_resolution_node` on the next graph step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_resolution: Option<BlockerResolution>,
}

impl ExecutionState {
    pub fn new(issue: impl Into<String>) -> Self {
        Self {
            issue: issue.into(),
            plan: None,
            current_stage: super::graph::stage::ARCHITECT.to_string(),
            current_batch_index: 0,
            skipped_step_ids: HashSet::new(),
            batch_results: Vec::new(),
            batch_approvals: Vec::new(),
            review_results: Vec::new(),
            review_iterations: 0,
            blocker: None,
            pre_batch_snapshot: None,
            human_approved: false,
            pending_instructions: Vec::new(),
            pending_resolution: None,
        }
    }

    pub fn current_batch(&self) -> Option<&super::model::Batch> {
        self.plan
            .as_ref()
            .and_then(|p| p.batches.get(self.current_batch_index))
    }

    pub fn is_last_batch(&self) -> bool {
        match &self.plan {
            Some(plan) => self.current_batch_index + 1 >= plan.batches.len(),
            None => true,
        }
    }

    pub fn completed_step_ids(&self) -> HashSet<String> {
        self.batch_results
            .iter()
            .flat_map(|br| br.step_results.iter())
            .filter(|r| r.status == super::model::DeveloperStatus::Completed)
            .map(|r| r.step_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_at_architect() {
        let state = ExecutionState::new("fix the login bug");
        assert_eq!(state.current_stage, "architect");
        assert_eq!(state.current_batch_index, 0);
        assert!(!state.human_approved);
    }

    #[test]
    fn is_last_batch_true_with_no_plan() {
        let state = ExecutionState::new("issue");
        assert!(state.is_last_batch());
    }
}
