//! Workflow model for database persistence
//!
//! A workflow is one run of the plan → approve → execute-in-batches →
//! review → fix graph against a single worktree. `plan_json` and
//! `state_json` hold the architect's [`crate::workflow::model::ExecutionPlan`]
//! and the graph's [`crate::workflow::state::ExecutionState`] respectively,
//! serialized the same way the teacher's `Checkpoint::state` column does.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents a workflow run in the orchestrator database.
///
/// # Timestamps
/// All timestamp fields are ISO8601 strings due to SQLite type limitations.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Workflow {
    /// Unique workflow identifier (UUID string)
    pub id: String,

    /// Issue/ticket this workflow was started for
    pub issue_id: String,

    /// Absolute path to the worktree this workflow executes against
    pub worktree_path: String,

    /// Human-readable worktree name (branch name, typically)
    pub worktree_name: String,

    /// Execution profile governing trust level, checkpoint cadence, retention
    pub profile_id: String,

    /// Current lifecycle status: see `workflow::state_machine::WorkflowStatus`
    pub status: String,

    /// Stop after producing a plan, without executing it
    pub plan_only: bool,

    /// Plan was supplied externally rather than produced by the architect node
    pub external_plan: bool,

    /// Name of the graph stage the workflow is currently on or paused at
    pub current_stage: String,

    /// The architect's plan, serialized as JSON (absent before planning completes)
    pub plan_json: Option<String>,

    /// The graph's `ExecutionState`, serialized as JSON
    pub state_json: Option<String>,

    /// Why the workflow failed, if `status == failed`
    pub failure_reason: Option<String>,

    /// Whether a failed workflow can be resumed from its last checkpoint
    pub recoverable: bool,

    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub updated_at: String,
}

impl Workflow {
    /// Create a new workflow in `planning` status with no plan or state yet.
    pub fn new(id: String, issue_id: String, worktree_path: String, worktree_name: String, profile_id: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            issue_id,
            worktree_path,
            worktree_name,
            profile_id,
            status: crate::workflow::WorkflowStatus::Planning.as_str().to_string(),
            plan_only: false,
            external_plan: false,
            current_stage: "architect".to_string(),
            plan_json: None,
            state_json: None,
            failure_reason: None,
            recoverable: true,
            created_at: now.clone(),
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn with_plan_only(mut self, plan_only: bool) -> Self {
        self.plan_only = plan_only;
        self
    }

    pub fn with_external_plan(mut self, external_plan: bool) -> Self {
        self.external_plan = external_plan;
        self
    }

    pub fn status(&self) -> Option<crate::workflow::WorkflowStatus> {
        crate::workflow::WorkflowStatus::parse(&self.status)
    }

    pub fn is_active(&self) -> bool {
        self.status().map(|s| !s.is_terminal()).unwrap_or(false)
    }
}
