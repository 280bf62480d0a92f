//! Workflow API models and DTOs

use serde::{Deserialize, Serialize};

use crate::db::models::Workflow;
use crate::workflow::model::BlockerResolution;

/// Request to start a new workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkflowRequest {
    /// Issue or ticket identifier the workflow is being run for
    pub issue_id: String,

    /// Absolute path to the worktree the workflow executes against
    pub worktree_path: String,

    /// Human-readable worktree name; defaults to the last path segment
    pub worktree_name: Option<String>,

    /// Execution profile id; defaults to `"default"`
    pub profile: Option<String>,

    /// Stop after producing a plan, without executing it (default false)
    #[serde(default)]
    pub plan_only: bool,
}

impl CreateWorkflowRequest {
    /// Validate the create request
    pub fn validate(&self) -> crate::api::error::ApiResult<()> {
        crate::api::middleware::validation::validate_not_empty(&self.issue_id, "issue_id")?;
        crate::api::middleware::validation::validate_not_empty(&self.worktree_path, "worktree_path")?;
        Ok(())
    }

    pub fn worktree_name(&self) -> String {
        self.worktree_name.clone().unwrap_or_else(|| {
            self.worktree_path
                .rsplit('/')
                .next()
                .unwrap_or(&self.worktree_path)
                .to_string()
        })
    }
}

/// Body of `POST /api/workflows/{id}/approve` and `.../reject`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Body of `POST /api/workflows/{id}/resolve-blocker`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveBlockerRequest {
    pub resolution: BlockerResolution,
}

/// Body of `POST /api/workflows/start-batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartBatchRequest {
    /// Specific workflow ids to start; omit to start every pending workflow
    pub workflow_ids: Option<Vec<String>>,
}

/// Result of a `start-batch` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartBatchResponse {
    pub started: Vec<String>,
    pub errors: std::collections::HashMap<String, String>,
}

/// Workflow response for API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub issue_id: String,
    pub worktree_path: String,
    pub worktree_name: String,
    pub profile_id: String,
    pub status: String,
    pub plan_only: bool,
    pub external_plan: bool,
    pub current_stage: String,
    pub failure_reason: Option<String>,
    pub recoverable: bool,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub updated_at: String,
}

impl WorkflowResponse {
    /// Build a `WorkflowResponse` from the database entity. Deliberately
    /// omits `plan_json`/`state_json`: those are internal checkpoint
    /// payloads, not part of the stable wire contract.
    pub fn from_db_workflow(workflow: Workflow) -> Self {
        Self {
            id: workflow.id,
            issue_id: workflow.issue_id,
            worktree_path: workflow.worktree_path,
            worktree_name: workflow.worktree_name,
            profile_id: workflow.profile_id,
            status: workflow.status,
            plan_only: workflow.plan_only,
            external_plan: workflow.external_plan,
            current_stage: workflow.current_stage,
            failure_reason: workflow.failure_reason,
            recoverable: workflow.recoverable,
            created_at: workflow.created_at,
            started_at: workflow.started_at,
            completed_at: workflow.completed_at,
            updated_at: workflow.updated_at,
        }
    }
}

/// Query parameters for listing workflows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowListQuery {
    /// Filter by status (optional)
    pub status: Option<String>,

    /// Opaque pagination cursor returned by a previous call
    pub cursor: Option<String>,

    /// Max rows to return (default 20, max 100)
    pub limit: Option<i64>,
}
