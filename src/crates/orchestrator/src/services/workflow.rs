//! The orchestrator service: start, drive, and steer workflows
//!
//! This is the owner of the `tokio::spawn` + `DashMap<WorkflowId, JoinHandle>`
//! task-launch model every workflow runs under. It wires
//! [`crate::workflow::graph::step`] to the database and event bus one stage at
//! a time rather than driving the whole graph in a single call, so that a
//! status transition can be chosen per outcome against
//! [`crate::workflow::state_machine::validate_transition`] instead of
//! collapsing every interrupt into the same edge.

use crate::config::Profile;
use crate::db::connection::{DatabaseConnection, DatabasePool};
use crate::db::models::Workflow;
use crate::db::repositories::{ListCursor, WorkflowRepository};
use crate::events::bus::EventBus;
use crate::events::model::{EventLevel, EventType};
use crate::integration::driver::Driver;
use crate::integration::vcs::{Git2VcsAdapter, VcsAdapter};
use crate::workflow::graph::{self, stage, GraphContext, NodeOutcome};
use crate::workflow::model::BlockerResolution;
use crate::workflow::state::ExecutionState;
use crate::workflow::state_machine::WorkflowStatus;
use crate::OrchestratorError;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::error;

/// Builds the `VcsAdapter` a workflow's drive loop talks to, given its
/// worktree path. Injectable so tests can hand back a [`crate::integration::vcs::FakeVcsAdapter`]
/// instead of opening a real repository.
pub type VcsFactory = Arc<dyn Fn(&str) -> Arc<dyn VcsAdapter> + Send + Sync>;

/// The production factory: one [`Git2VcsAdapter`] per worktree path.
pub fn git2_vcs_factory() -> VcsFactory {
    Arc::new(|worktree_path: &str| Arc::new(Git2VcsAdapter::new(worktree_path.to_string())) as Arc<dyn VcsAdapter>)
}

/// Owns every in-flight workflow's drive task. Cloning is cheap: every field
/// is a handle (`Arc`, `DatabaseConnection`) shared across clones, the way
/// `api::routes::AppState` shares its `DatabaseConnection` today.
#[derive(Clone)]
pub struct OrchestratorService {
    db: DatabaseConnection,
    events: Arc<EventBus>,
    driver: Arc<dyn Driver>,
    vcs_factory: VcsFactory,
    profiles: Arc<HashMap<String, Profile>>,
    max_active_workflows: usize,
    running: Arc<DashMap<String, JoinHandle<()>>>,
}

impl OrchestratorService {
    pub fn new(
        db: DatabaseConnection,
        events: Arc<EventBus>,
        driver: Arc<dyn Driver>,
        vcs_factory: VcsFactory,
        profiles: Vec<Profile>,
        max_active_workflows: usize,
    ) -> Self {
        let profiles = profiles.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            db,
            events,
            driver,
            vcs_factory,
            profiles: Arc::new(profiles),
            max_active_workflows,
            running: Arc::new(DashMap::new()),
        }
    }

    fn profile_for(&self, profile_id: &str) -> Profile {
        self.profiles
            .get(profile_id)
            .cloned()
            .unwrap_or_else(Profile::default_standard)
    }

    /// The event bus backing this service, for wiring a real-time
    /// subscription endpoint alongside the request/response API.
    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn db_pool(&self) -> &DatabasePool {
        self.db.pool()
    }

    /// Create a workflow row and an `architect`-stage execution state, then
    /// launch its drive task. Rejects a second active workflow against the
    /// same worktree (the real enforcement is `idx_workflows_worktree_active`;
    /// this is just the fast, friendly path to the same error) and rejects
    /// launching past `max_active_workflows`.
    pub async fn start(
        &self,
        issue: impl Into<String>,
        worktree_path: impl Into<String>,
        worktree_name: impl Into<String>,
        profile_id: Option<String>,
        plan_only: bool,
    ) -> Result<Workflow, OrchestratorError> {
        let pool = self.db.pool();

        let active = WorkflowRepository::count_active(pool).await?;
        if active as usize >= self.max_active_workflows {
            return Err(OrchestratorError::ConcurrencyLimit {
                running: active as usize,
                cap: self.max_active_workflows,
            });
        }

        let worktree_path = worktree_path.into();
        if WorkflowRepository::get_by_worktree(pool, &worktree_path).await?.is_some() {
            return Err(OrchestratorError::WorkflowConflict(worktree_path));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let profile_id = profile_id.unwrap_or_else(|| "default".to_string());
        let workflow = Workflow::new(id, issue.into(), worktree_path, worktree_name.into(), profile_id)
            .with_plan_only(plan_only);

        let created = match WorkflowRepository::create(pool, &workflow).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(OrchestratorError::WorkflowConflict(workflow.worktree_path));
            }
            Err(e) => return Err(e.into()),
        };

        let state = ExecutionState::new(created.issue_id.clone());
        WorkflowRepository::save_state(pool, &created.id, &state).await?;

        self.events
            .emit_workflow(
                &created.id,
                "orchestrator",
                EventType::WorkflowStarted,
                EventLevel::Info,
                "workflow queued".to_string(),
                None,
            )
            .await;

        self.spawn_drive(created.id.clone());
        Ok(created)
    }

    /// Record a plan/batch approval decision and resume the drive loop.
    /// Applies to both `human_approval` and `batch_approval`, which share the
    /// same `human_approved` flag (see `workflow::graph`).
    pub async fn submit_approval(&self, workflow_id: &str, approved: bool) -> Result<(), OrchestratorError> {
        let pool = self.db.pool();
        let workflow = self.require_workflow(workflow_id).await?;
        if workflow.status() != Some(WorkflowStatus::Pending) {
            return Err(OrchestratorError::General(format!(
                "workflow {workflow_id} is not awaiting approval (status: {})",
                workflow.status
            )));
        }

        let mut state = WorkflowRepository::load_state(pool, workflow_id)
            .await?
            .ok_or_else(|| OrchestratorError::ExecutionFailed("workflow has no execution state".into()))?;
        state.human_approved = approved;
        WorkflowRepository::save_state(pool, workflow_id, &state).await?;

        self.spawn_drive(workflow_id.to_string());
        Ok(())
    }

    /// Record a human's resolution for a blocked workflow and resume.
    pub async fn resolve_blocker(
        &self,
        workflow_id: &str,
        resolution: BlockerResolution,
    ) -> Result<(), OrchestratorError> {
        let pool = self.db.pool();
        let workflow = self.require_workflow(workflow_id).await?;
        if workflow.status() != Some(WorkflowStatus::Blocked) {
            return Err(OrchestratorError::General(format!(
                "workflow {workflow_id} is not blocked (status: {})",
                workflow.status
            )));
        }

        let mut state = WorkflowRepository::load_state(pool, workflow_id)
            .await?
            .ok_or_else(|| OrchestratorError::ExecutionFailed("workflow has no execution state".into()))?;
        state.pending_resolution = Some(resolution);
        WorkflowRepository::save_state(pool, workflow_id, &state).await?;

        self.spawn_drive(workflow_id.to_string());
        Ok(())
    }

    /// Re-arm a drive task for a workflow that is already waiting on a
    /// decision recorded in its `state_json` (the process that would have
    /// acted on it died first). Does not itself record a new decision; call
    /// [`Self::submit_approval`] or [`Self::resolve_blocker`] for that.
    pub async fn resume(&self, workflow_id: &str) -> Result<(), OrchestratorError> {
        let workflow = self.require_workflow(workflow_id).await?;
        match workflow.status() {
            Some(WorkflowStatus::Pending) | Some(WorkflowStatus::Blocked) => {
                self.spawn_drive(workflow_id.to_string());
                Ok(())
            }
            _ => Err(OrchestratorError::General(format!(
                "workflow {workflow_id} cannot be resumed from status {}",
                workflow.status
            ))),
        }
    }

    /// Cancel a workflow and abort its drive task, if one is running.
    /// `Cancelled` is reachable from every non-terminal status.
    pub async fn cancel(&self, workflow_id: &str) -> Result<Workflow, OrchestratorError> {
        let updated = WorkflowRepository::set_status(self.db.pool(), workflow_id, WorkflowStatus::Cancelled, None)
            .await?;
        if let Some((_, handle)) = self.running.remove(workflow_id) {
            handle.abort();
        }
        self.events
            .emit_workflow(
                workflow_id,
                "orchestrator",
                EventType::WorkflowCancelled,
                EventLevel::Info,
                "workflow cancelled".to_string(),
                None,
            )
            .await;
        Ok(updated)
    }

    pub async fn get(&self, workflow_id: &str) -> Result<Option<Workflow>, OrchestratorError> {
        Ok(WorkflowRepository::get_by_id(self.db.pool(), workflow_id).await?)
    }

    pub async fn list(
        &self,
        status: Option<WorkflowStatus>,
        limit: i64,
        cursor: Option<ListCursor>,
    ) -> Result<Vec<Workflow>, OrchestratorError> {
        Ok(WorkflowRepository::list(self.db.pool(), status, limit, cursor).await?)
    }

    async fn require_workflow(&self, workflow_id: &str) -> Result<Workflow, OrchestratorError> {
        WorkflowRepository::get_by_id(self.db.pool(), workflow_id)
            .await?
            .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))
    }

    fn spawn_drive(&self, workflow_id: String) {
        let service = self.clone();
        let task_id = workflow_id.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = service.drive(&task_id).await {
                error!("workflow {task_id} drive loop ended in error: {e}");
            }
            service.running.remove(&task_id);
        });
        self.running.insert(workflow_id, handle);
    }

    /// Advance a workflow one node at a time until it interrupts, finishes,
    /// or errors. Every node's status transition is chosen against the
    /// concrete status the workflow was in when the node ran, rather than
    /// assuming a single bridge status for every interrupt: a `Pending`
    /// resume is bridged through `InProgress` before the node runs (so a
    /// node that finishes directly, like `review_approval`, lands on a valid
    /// edge), but a `Blocked` resume is left alone until the node's outcome
    /// is known, since `Blocked -> Aborted` is the only edge out of `Blocked`
    /// that doesn't pass through `InProgress` first.
    async fn drive(&self, workflow_id: &str) -> Result<(), OrchestratorError> {
        let pool = self.db.pool();

        loop {
            let workflow = self.require_workflow(workflow_id).await?;
            let mut status = match workflow.status() {
                Some(s) if !s.is_terminal() => s,
                _ => return Ok(()),
            };

            let mut state = WorkflowRepository::load_state(pool, workflow_id)
                .await?
                .ok_or_else(|| OrchestratorError::ExecutionFailed("workflow has no execution state".into()))?;

            if status == WorkflowStatus::Pending {
                WorkflowRepository::set_status(pool, workflow_id, WorkflowStatus::InProgress, None).await?;
                status = WorkflowStatus::InProgress;
            }

            let ctx = GraphContext {
                driver: self.driver.clone(),
                vcs: (self.vcs_factory)(&workflow.worktree_path),
                events: self.events.clone(),
                profile: self.profile_for(&workflow.profile_id),
                workflow_id: workflow_id.to_string(),
            };

            let outcome = graph::step(&ctx, &mut state).await;

            if let Err(e) = WorkflowRepository::save_state(pool, workflow_id, &state).await {
                error!("failed to persist state for workflow {workflow_id}: {e}");
            }

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    WorkflowRepository::set_status(pool, workflow_id, WorkflowStatus::Failed, Some(&e.to_string()))
                        .await?;
                    return Err(e);
                }
            };

            match outcome {
                NodeOutcome::Advance(_) => {
                    if status != WorkflowStatus::InProgress {
                        WorkflowRepository::set_status(pool, workflow_id, WorkflowStatus::InProgress, None).await?;
                    }
                    continue;
                }
                NodeOutcome::Interrupt(next_stage) => {
                    let target = if next_stage == stage::BLOCKER_RESOLUTION {
                        WorkflowStatus::Blocked
                    } else {
                        WorkflowStatus::Pending
                    };
                    if status != target {
                        WorkflowRepository::set_status(pool, workflow_id, target, None).await?;
                    }
                    self.events
                        .emit_workflow(
                            workflow_id,
                            "orchestrator",
                            EventType::ApprovalRequired,
                            EventLevel::Info,
                            format!("awaiting input before {next_stage}"),
                            None,
                        )
                        .await;
                    return Ok(());
                }
                NodeOutcome::Finish(final_status) => {
                    WorkflowRepository::set_status(pool, workflow_id, final_status, None).await?;
                    let event_type = match final_status {
                        WorkflowStatus::Completed => EventType::WorkflowCompleted,
                        WorkflowStatus::Cancelled => EventType::WorkflowCancelled,
                        WorkflowStatus::Aborted | WorkflowStatus::Failed => EventType::WorkflowFailed,
                        other => {
                            return Err(OrchestratorError::ExecutionFailed(format!(
                                "graph finished into non-terminal status {other}"
                            )))
                        }
                    };
                    self.events
                        .emit_workflow(
                            workflow_id,
                            "orchestrator",
                            event_type,
                            EventLevel::Info,
                            format!("workflow finished: {final_status}"),
                            None,
                        )
                        .await;
                    return Ok(());
                }
            }
        }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().map(|de| de.is_unique_violation()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustLevel;
    use crate::integration::driver::test_support::FakeDriver;
    use crate::integration::vcs::FakeVcsAdapter;
    use crate::workflow::model::{ActionType, Batch, ExecutionPlan, PlanStep, ReviewResult, RiskLevel};

    async fn test_db() -> DatabaseConnection {
        let conn = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        conn.run_migrations().await.unwrap();
        conn
    }

    fn fake_vcs_factory() -> VcsFactory {
        Arc::new(|_path: &str| Arc::new(FakeVcsAdapter::new("deadbeef")) as Arc<dyn VcsAdapter>)
    }

    fn review_ok() -> ReviewResult {
        ReviewResult {
            approved: true,
            feedback: "looks good".to_string(),
            requested_changes: vec![],
        }
    }

    fn one_step_plan() -> ExecutionPlan {
        ExecutionPlan {
            summary: "do the thing".to_string(),
            rationale: None,
            batches: vec![Batch {
                id: "b1".to_string(),
                description: String::new(),
                requires_approval: false,
                risk_summary: RiskLevel::Low,
                steps: vec![PlanStep {
                    id: "s1".to_string(),
                    description: String::new(),
                    action_type: ActionType::Validation,
                    risk_level: RiskLevel::Low,
                    file_path: None,
                    code_change: None,
                    command: None,
                    cwd: None,
                    validation_command: Some("true".to_string()),
                    expected_output_pattern: None,
                    fallback_commands: vec![],
                    depends_on: vec![],
                    requires_human_judgment: false,
                    expect_exit_code: 0,
                    is_test_step: false,
                    validates_step: None,
                }],
            }],
            total_estimated_minutes: 0,
            tdd_approach: false,
        }
    }

    async fn build_service(driver: Arc<dyn Driver>, max_active: usize) -> (OrchestratorService, DatabaseConnection) {
        let db = test_db().await;
        let events = Arc::new(EventBus::new(None));
        let profile = Profile {
            id: "default".to_string(),
            trust_level: TrustLevel::Standard,
            batch_checkpoint_enabled: false,
            max_review_iterations: 3,
            plan_artifact_path_template: "/tmp/{workflow_id}/plan.json".to_string(),
            event_retention_days: 30,
            checkpoint_retention_days: 30,
        };
        let service = OrchestratorService::new(db.clone(), events, driver, fake_vcs_factory(), vec![profile], max_active);
        (service, db)
    }

    #[tokio::test]
    async fn start_rejects_duplicate_worktree_path() {
        let driver: Arc<dyn Driver> = Arc::new(FakeDriver { plan: one_step_plan(), review: review_ok() });
        let (service, db) = build_service(driver, 10).await;

        let occupying = Workflow::new(
            "occupying".to_string(),
            "ISSUE-1".to_string(),
            "/tmp/wt-shared".to_string(),
            "branch".to_string(),
            "default".to_string(),
        );
        WorkflowRepository::create(db.pool(), &occupying).await.unwrap();

        let err = service
            .start("fix the bug", "/tmp/wt-shared", "branch-b", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::WorkflowConflict(_)));
    }

    #[tokio::test]
    async fn start_respects_concurrency_cap() {
        let driver: Arc<dyn Driver> = Arc::new(FakeDriver { plan: one_step_plan(), review: review_ok() });
        let (service, db) = build_service(driver, 1).await;

        let occupying = Workflow::new(
            "occupying".to_string(),
            "ISSUE-1".to_string(),
            "/tmp/wt-a".to_string(),
            "branch".to_string(),
            "default".to_string(),
        );
        WorkflowRepository::create(db.pool(), &occupying).await.unwrap();

        let err = service
            .start("fix the bug", "/tmp/wt-b", "branch-b", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ConcurrencyLimit { .. }));
    }

    #[tokio::test]
    async fn drive_runs_a_plan_through_to_completion() {
        let driver: Arc<dyn Driver> = Arc::new(FakeDriver { plan: one_step_plan(), review: review_ok() });
        let (service, db) = build_service(driver, 10).await;
        let pool = db.pool();

        let workflow = Workflow::new(
            "wf-1".to_string(),
            "ISSUE-1".to_string(),
            "/tmp/wt-1".to_string(),
            "branch".to_string(),
            "default".to_string(),
        );
        WorkflowRepository::create(pool, &workflow).await.unwrap();
        WorkflowRepository::save_state(pool, "wf-1", &ExecutionState::new("fix the bug")).await.unwrap();

        // architect -> plan_validator -> interrupts for human approval
        service.drive("wf-1").await.unwrap();
        let wf = WorkflowRepository::get_by_id(pool, "wf-1").await.unwrap().unwrap();
        assert_eq!(wf.status, "pending");
        assert_eq!(wf.current_stage, "human_approval");

        // approve, then resume: developer executes the batch and the
        // reviewer interrupts again for the review-approval gate
        let mut state = WorkflowRepository::load_state(pool, "wf-1").await.unwrap().unwrap();
        state.human_approved = true;
        WorkflowRepository::save_state(pool, "wf-1", &state).await.unwrap();
        service.drive("wf-1").await.unwrap();

        let wf = WorkflowRepository::get_by_id(pool, "wf-1").await.unwrap().unwrap();
        assert_eq!(wf.status, "pending");
        assert_eq!(wf.current_stage, "review_approval");

        // resuming again finishes the workflow, since FakeDriver's review
        // verdict is already approved
        service.drive("wf-1").await.unwrap();
        let wf = WorkflowRepository::get_by_id(pool, "wf-1").await.unwrap().unwrap();
        assert_eq!(wf.status, "completed");
        assert!(wf.completed_at.is_some());
    }

    #[tokio::test]
    async fn drive_rejects_plan_cancels_workflow() {
        let driver: Arc<dyn Driver> = Arc::new(FakeDriver { plan: one_step_plan(), review: review_ok() });
        let (service, db) = build_service(driver, 10).await;
        let pool = db.pool();

        let workflow = Workflow::new(
            "wf-2".to_string(),
            "ISSUE-2".to_string(),
            "/tmp/wt-2".to_string(),
            "branch".to_string(),
            "default".to_string(),
        );
        WorkflowRepository::create(pool, &workflow).await.unwrap();
        WorkflowRepository::save_state(pool, "wf-2", &ExecutionState::new("fix the bug")).await.unwrap();

        service.drive("wf-2").await.unwrap();
        assert_eq!(
            WorkflowRepository::get_by_id(pool, "wf-2").await.unwrap().unwrap().status,
            "pending"
        );

        let mut state = WorkflowRepository::load_state(pool, "wf-2").await.unwrap().unwrap();
        state.human_approved = false;
        WorkflowRepository::save_state(pool, "wf-2", &state).await.unwrap();
        service.drive("wf-2").await.unwrap();

        assert_eq!(
            WorkflowRepository::get_by_id(pool, "wf-2").await.unwrap().unwrap().status,
            "cancelled"
        );
    }

    #[tokio::test]
    async fn cancel_aborts_running_task() {
        let driver: Arc<dyn Driver> = Arc::new(FakeDriver { plan: one_step_plan(), review: review_ok() });
        let (service, db) = build_service(driver, 10).await;
        let pool = db.pool();

        let workflow = Workflow::new(
            "wf-3".to_string(),
            "ISSUE-3".to_string(),
            "/tmp/wt-3".to_string(),
            "branch".to_string(),
            "default".to_string(),
        );
        WorkflowRepository::create(pool, &workflow).await.unwrap();

        let cancelled = service.cancel("wf-3").await.unwrap();
        assert_eq!(cancelled.status, "cancelled");
        assert!(service.cancel("wf-3").await.is_err());
    }
}
