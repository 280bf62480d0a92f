//! Execution graph: named stages connected by static and conditional edges
//!
//! Mirrors the node/edge/topological-loop shape of
//! [`crate::execution::workflow_engine::WorkflowExecutionEngine`], generalized
//! from that engine's generic JSON-node dispatch to a fixed set of async
//! stage functions operating directly on [`super::state::ExecutionState`].
//! There is no generic channel/reducer machinery here: `ExecutionState`'s
//! fields are merged node-by-node the way the teacher's Pregel engine merges
//! channels (`skipped_step_ids` as set union, `batch_results`/
//! `review_results` as append, everything else replaced outright) because
//! this graph only ever runs one concrete state type.

use super::blocker::{apply_resolution, ResolutionEffect};
use super::model::{Batch, BlockerReport, DeveloperStatus, ExecutionPlan, ReviewResult, RiskLevel};
use super::state::ExecutionState;
use super::state_machine::{validate_transition, WorkflowStatus};
use crate::config::Profile;
use crate::events::bus::EventBus;
use crate::events::model::EventType;
use crate::executor::batch::BatchExecutor;
use crate::integration::driver::Driver;
use crate::integration::vcs::VcsAdapter;
use crate::OrchestratorError;
use std::sync::Arc;

/// Names of every stage the graph knows how to route to. Kept as string
/// constants rather than unlocking an enum-only set of names so that
/// `ExecutionState::current_stage` (which is persisted) doesn't need a
/// migration every time a node is added, matching the teacher's plain-string
/// `current_node` field in `WorkflowExecutionState`.
pub mod stage {
    pub const ARCHITECT: &str = "architect";
    pub const PLAN_VALIDATOR: &str = "plan_validator";
    pub const HUMAN_APPROVAL: &str = "human_approval";
    pub const DEVELOPER: &str = "developer";
    pub const BATCH_APPROVAL: &str = "batch_approval";
    pub const BLOCKER_RESOLUTION: &str = "blocker_resolution";
    pub const REVIEWER: &str = "reviewer";
    pub const REVIEW_APPROVAL: &str = "review_approval";
    pub const END: &str = "end";
}

/// What happened after a node ran, and what the graph should do next.
pub enum NodeOutcome {
    /// Proceed immediately to the named stage (no human involved).
    Advance(&'static str),
    /// Persist a checkpoint and suspend; a human decision is required before
    /// the named stage can run.
    Interrupt(&'static str),
    /// The workflow has reached a terminal outcome.
    Finish(WorkflowStatus),
}

/// Shared collaborators every node needs. Constructed once per running
/// workflow by `services::workflow`.
pub struct GraphContext {
    pub driver: Arc<dyn Driver>,
    pub vcs: Arc<dyn VcsAdapter>,
    pub events: Arc<EventBus>,
    pub profile: Profile,
    pub workflow_id: String,
}

/// Advance the graph by exactly one node, starting from
/// `state.current_stage`. Returns the outcome so the caller (the workflow
/// task loop in `services::workflow`) can decide whether to checkpoint, loop
/// immediately, or suspend.
pub async fn step(ctx: &GraphContext, state: &mut ExecutionState) -> Result<NodeOutcome, OrchestratorError> {
    let stage_name = state.current_stage.clone();
    match stage_name.as_str() {
        stage::ARCHITECT => architect_node(ctx, state).await,
        stage::PLAN_VALIDATOR => plan_validator_node(ctx, state).await,
        stage::HUMAN_APPROVAL => human_approval_node(ctx, state).await,
        stage::DEVELOPER => developer_node(ctx, state).await,
        stage::BATCH_APPROVAL => batch_approval_node(ctx, state).await,
        stage::BLOCKER_RESOLUTION => blocker_resolution_node(ctx, state).await,
        stage::REVIEWER => reviewer_node(ctx, state).await,
        stage::REVIEW_APPROVAL => review_approval_node(ctx, state).await,
        other => Err(OrchestratorError::ExecutionFailed(format!("unknown stage {other}"))),
    }
}

async fn emit(ctx: &GraphContext, event_type: EventType, message: impl Into<String>) {
    let level = event_type.default_level();
    ctx.events
        .emit_workflow(&ctx.workflow_id, "orchestrator", event_type, level, message.into(), None)
        .await;
}

async fn architect_node(ctx: &GraphContext, state: &mut ExecutionState) -> Result<NodeOutcome, OrchestratorError> {
    emit(ctx, EventType::StageStarted, "architect composing execution plan").await;

    let plan = ctx
        .driver
        .generate_plan(&state.issue, &state.pending_instructions)
        .await
        .map_err(|e| OrchestratorError::ExecutionFailed(format!("architect failed: {e}")))?;

    state.plan = Some(plan);
    state.current_stage = stage::PLAN_VALIDATOR.to_string();
    emit(ctx, EventType::StageCompleted, "plan produced").await;
    Ok(NodeOutcome::Advance(stage::PLAN_VALIDATOR))
}

async fn plan_validator_node(ctx: &GraphContext, state: &mut ExecutionState) -> Result<NodeOutcome, OrchestratorError> {
    let plan = state
        .plan
        .as_mut()
        .ok_or_else(|| OrchestratorError::ExecutionFailed("plan_validator reached with no plan".into()))?;

    plan.validate_dag()
        .map_err(|e| OrchestratorError::ExecutionFailed(format!("invalid plan: {e}")))?;

    let warnings = enforce_batch_size_limits(plan);

    for warning in warnings {
        emit(ctx, EventType::SystemWarning, warning).await;
    }

    state.current_stage = stage::HUMAN_APPROVAL.to_string();
    emit(ctx, EventType::StageCompleted, "plan validated").await;
    Ok(NodeOutcome::Interrupt(stage::HUMAN_APPROVAL))
}

/// Split any batch whose step count exceeds its risk tier's limit
/// (low ≤ 5, medium ≤ 3, high = 1) into consecutively numbered batches of at
/// most that size, and stamp every batch's `risk_summary`. Returns one
/// warning per split performed.
fn enforce_batch_size_limits(plan: &mut ExecutionPlan) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut rebuilt = Vec::with_capacity(plan.batches.len());

    for batch in plan.batches.drain(..) {
        let risk = RiskLevel::of_steps(&batch.steps);
        let limit = Batch::size_limit_for(risk);

        if batch.steps.len() <= limit {
            rebuilt.push(Batch { risk_summary: risk, ..batch });
            continue;
        }

        warnings.push(format!(
            "batch {} has {} steps, exceeding the {:?}-risk limit of {}; splitting into {} batches",
            batch.id,
            batch.steps.len(),
            risk,
            limit,
            batch.steps.len().div_ceil(limit),
        ));

        for (i, chunk) in batch.steps.chunks(limit).enumerate() {
            rebuilt.push(Batch {
                id: format!("{}-{}", batch.id, i + 1),
                description: batch.description.clone(),
                steps: chunk.to_vec(),
                requires_approval: batch.requires_approval,
                risk_summary: RiskLevel::of_steps(chunk),
            });
        }
    }

    plan.batches = rebuilt;
    warnings
}

/// Reads `state.human_approved`, set by the service layer from an approval
/// decision before resuming the graph.
async fn human_approval_node(ctx: &GraphContext, state: &mut ExecutionState) -> Result<NodeOutcome, OrchestratorError> {
    if state.human_approved {
        state.current_stage = stage::DEVELOPER.to_string();
        emit(ctx, EventType::ApprovalGranted, "plan approved").await;
        Ok(NodeOutcome::Advance(stage::DEVELOPER))
    } else {
        emit(ctx, EventType::ApprovalRejected, "plan rejected").await;
        Ok(NodeOutcome::Finish(WorkflowStatus::Cancelled))
    }
}

async fn developer_node(ctx: &GraphContext, state: &mut ExecutionState) -> Result<NodeOutcome, OrchestratorError> {
    let plan = state
        .plan
        .clone()
        .ok_or_else(|| OrchestratorError::ExecutionFailed("developer reached with no plan".into()))?;

    let Some(batch) = state.current_batch().cloned() else {
        state.current_stage = stage::REVIEWER.to_string();
        return Ok(NodeOutcome::Advance(stage::REVIEWER));
    };

    state.pre_batch_snapshot = Some(
        ctx.vcs
            .snapshot(&batch.id)
            .await
            .map_err(|e| OrchestratorError::ExecutionFailed(format!("snapshot failed: {e}")))?,
    );

    let executor = BatchExecutor::new(ctx.driver.clone());
    let result = executor
        .execute_batch(&plan, &batch, &state.skipped_step_ids)
        .await;

    let blocked = !result.all_succeeded;
    state.batch_results.push(result.clone());

    if blocked {
        state.blocker = Some(BlockerReport {
            batch_id: batch.id.clone(),
            failed_step_ids: result.failed_step_ids().into_iter().map(str::to_string).collect(),
            reason: "one or more steps failed".to_string(),
        });
        state.current_stage = stage::BLOCKER_RESOLUTION.to_string();
        emit(ctx, EventType::TaskFailed, format!("batch {} blocked", batch.id)).await;
        return Ok(NodeOutcome::Interrupt(stage::BLOCKER_RESOLUTION));
    }

    state.current_batch_index += 1;
    emit(ctx, EventType::TaskCompleted, format!("batch {} completed", batch.id)).await;

    if state.is_last_batch() {
        state.current_stage = stage::REVIEWER.to_string();
        Ok(NodeOutcome::Advance(stage::REVIEWER))
    } else if requires_batch_approval(&ctx.profile, state) {
        state.current_stage = stage::BATCH_APPROVAL.to_string();
        Ok(NodeOutcome::Interrupt(stage::BATCH_APPROVAL))
    } else {
        state.current_stage = stage::DEVELOPER.to_string();
        Ok(NodeOutcome::Advance(stage::DEVELOPER))
    }
}

/// Autonomous-trust-level low-risk batches and a disabled batch-checkpoint
/// policy both collapse to "don't stop" (see DESIGN.md).
fn requires_batch_approval(profile: &Profile, state: &ExecutionState) -> bool {
    if !profile.batch_checkpoint_enabled {
        return false;
    }
    let Some(next_batch) = state.current_batch() else {
        return false;
    };
    if next_batch.requires_approval {
        return true;
    }
    let next_is_low_risk = next_batch
        .steps
        .iter()
        .all(|s| s.risk_level == super::model::RiskLevel::Low);
    !(profile.trust_level == crate::config::TrustLevel::Autonomous && next_is_low_risk)
}

async fn batch_approval_node(ctx: &GraphContext, state: &mut ExecutionState) -> Result<NodeOutcome, OrchestratorError> {
    // current_batch_index already advanced past the batch this approval is for.
    let batch_index = state.current_batch_index.saturating_sub(1);
    let approved = state.human_approved;
    state.batch_approvals.push(super::model::BatchApproval {
        batch_index,
        approved,
        feedback: None,
        timestamp: chrono::Utc::now(),
    });

    if approved {
        state.human_approved = false;
        state.current_stage = stage::DEVELOPER.to_string();
        emit(ctx, EventType::ApprovalGranted, "batch approved").await;
        Ok(NodeOutcome::Advance(stage::DEVELOPER))
    } else {
        emit(ctx, EventType::ApprovalRejected, "batch rejected").await;
        Ok(NodeOutcome::Finish(WorkflowStatus::Cancelled))
    }
}

async fn blocker_resolution_node(ctx: &GraphContext, state: &mut ExecutionState) -> Result<NodeOutcome, OrchestratorError> {
    let Some(resolution) = state.pending_resolution.take() else {
        return Ok(NodeOutcome::Interrupt(stage::BLOCKER_RESOLUTION));
    };

    let plan = state
        .plan
        .clone()
        .ok_or_else(|| OrchestratorError::ExecutionFailed("blocker_resolution reached with no plan".into()))?;

    match apply_resolution(state, &plan, resolution) {
        ResolutionEffect::Resume => {
            state.current_stage = stage::DEVELOPER.to_string();
            emit(ctx, EventType::TaskStarted, "resuming after blocker resolution").await;
            Ok(NodeOutcome::Advance(stage::DEVELOPER))
        }
        ResolutionEffect::Abort => {
            emit(ctx, EventType::WorkflowCancelled, "aborted by human").await;
            Ok(NodeOutcome::Finish(WorkflowStatus::Aborted))
        }
        ResolutionEffect::AbortAndRevert { snapshot } => {
            if let Some(snapshot) = &snapshot {
                ctx.vcs
                    .restore(snapshot)
                    .await
                    .map_err(|e| OrchestratorError::ExecutionFailed(format!("revert failed: {e}")))?;
            }
            let message = match &snapshot {
                Some(s) => format!("aborted and reverted to {}", s.commit_hash),
                None => "aborted (no pre-batch snapshot to revert to)".to_string(),
            };
            emit(ctx, EventType::WorkflowCancelled, message).await;
            Ok(NodeOutcome::Finish(WorkflowStatus::Aborted))
        }
    }
}

async fn reviewer_node(ctx: &GraphContext, state: &mut ExecutionState) -> Result<NodeOutcome, OrchestratorError> {
    emit(ctx, EventType::ReviewRequested, "requesting review of accumulated changes").await;

    let verdict = ctx
        .driver
        .review_changes(&state.issue, &state.batch_results)
        .await
        .map_err(|e| OrchestratorError::ExecutionFailed(format!("reviewer failed: {e}")))?;

    let approved = verdict.approved;
    state.review_results.push(verdict);
    state.current_stage = stage::REVIEW_APPROVAL.to_string();
    emit(ctx, EventType::ReviewCompleted, format!("review complete, approved={approved}")).await;
    Ok(NodeOutcome::Interrupt(stage::REVIEW_APPROVAL))
}

/// Build a single fix batch out of a rejected review's requested changes, one
/// step per item (falling back to the review's free-form feedback when no
/// itemized changes were given). Steps require human judgment since there's
/// no mechanical success check for "did this address the review comment".
fn synthesize_fix_batch(review: &ReviewResult, iteration: u32) -> Batch {
    let changes: Vec<String> = if review.requested_changes.is_empty() {
        vec![review.feedback.clone()]
    } else {
        review.requested_changes.clone()
    };

    let steps: Vec<super::model::PlanStep> = changes
        .into_iter()
        .enumerate()
        .map(|(i, change)| super::model::PlanStep {
            id: format!("review-fix-{iteration}-{i}"),
            description: change,
            action_type: super::model::ActionType::Code,
            risk_level: RiskLevel::Medium,
            file_path: None,
            code_change: None,
            command: None,
            cwd: None,
            validation_command: None,
            expected_output_pattern: None,
            fallback_commands: vec![],
            depends_on: vec![],
            requires_human_judgment: true,
            expect_exit_code: 0,
            is_test_step: false,
            validates_step: None,
        })
        .collect();

    Batch {
        id: format!("review-fix-{iteration}"),
        description: "fix batch synthesized from review feedback".to_string(),
        risk_summary: RiskLevel::of_steps(&steps),
        steps,
        requires_approval: false,
    }
}

async fn review_approval_node(ctx: &GraphContext, state: &mut ExecutionState) -> Result<NodeOutcome, OrchestratorError> {
    let last: Option<ReviewResult> = state.review_results.last().cloned();
    let approved = last.as_ref().map(|r| r.approved).unwrap_or(false);

    if approved {
        state.current_stage = stage::END.to_string();
        emit(ctx, EventType::ReviewCompleted, "changes approved").await;
        return Ok(NodeOutcome::Finish(WorkflowStatus::Completed));
    }

    state.review_iterations += 1;
    let plan_non_empty = state.plan.as_ref().is_some_and(|p| !p.batches.is_empty());
    if state.review_iterations >= ctx.profile.max_review_iterations || !plan_non_empty {
        emit(ctx, EventType::ReviewCompleted, "review iteration budget exhausted").await;
        return Ok(NodeOutcome::Finish(WorkflowStatus::Failed));
    }

    let review = last.ok_or_else(|| {
        OrchestratorError::ExecutionFailed("review_approval reached with no review result".into())
    })?;
    let fix_batch = synthesize_fix_batch(&review, state.review_iterations);
    if let Some(plan) = state.plan.as_mut() {
        plan.batches = vec![fix_batch];
    }
    state.current_batch_index = 0;
    state.current_stage = stage::DEVELOPER.to_string();
    emit(ctx, EventType::RevisionRequested, "re-entering developer with synthesized fix batch").await;
    Ok(NodeOutcome::Advance(stage::DEVELOPER))
}

/// Drive the graph forward until it interrupts or finishes, persisting a
/// checkpoint after every node via `on_checkpoint`. Mirrors the step-limited
/// loop in `WorkflowExecutionEngine::execute_workflow_internal`, generalized
/// to conditional routing and interrupt suspension instead of a fixed DAG.
pub async fn run_until_interrupt<F, Fut>(
    ctx: &GraphContext,
    state: &mut ExecutionState,
    mut on_checkpoint: F,
) -> Result<NodeOutcome, OrchestratorError>
where
    F: FnMut(&ExecutionState) -> Fut,
    Fut: std::future::Future<Output = Result<(), OrchestratorError>>,
{
    const MAX_STEPS: u32 = 10_000;
    for _ in 0..MAX_STEPS {
        let outcome = step(ctx, state).await?;
        on_checkpoint(state).await?;
        match outcome {
            NodeOutcome::Advance(_) => continue,
            NodeOutcome::Interrupt(_) | NodeOutcome::Finish(_) => return Ok(outcome),
        }
    }
    Err(OrchestratorError::ExecutionFailed("graph exceeded step limit".into()))
}

/// Validate a requested status transition against the concrete current
/// status, surfacing a typed error instead of the raw `(from, to)` tuple.
pub fn checked_transition(from: WorkflowStatus, to: WorkflowStatus) -> Result<(), OrchestratorError> {
    validate_transition(from, to).map_err(|(from, to)| OrchestratorError::InvalidStateTransition { from, to })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Profile, TrustLevel};
    use crate::workflow::model::{ActionType, Batch, ExecutionPlan, PlanStep, RiskLevel};

    fn profile(trust: TrustLevel, checkpoint: bool) -> Profile {
        Profile {
            id: "default".to_string(),
            trust_level: trust,
            batch_checkpoint_enabled: checkpoint,
            max_review_iterations: 3,
            plan_artifact_path_template: "/tmp/{workflow_id}/plan.json".to_string(),
            event_retention_days: 30,
            checkpoint_retention_days: 30,
        }
    }

    fn plan_step(id: &str) -> PlanStep {
        PlanStep {
            id: id.to_string(),
            description: String::new(),
            action_type: ActionType::Code,
            risk_level: RiskLevel::Low,
            file_path: None,
            code_change: None,
            command: None,
            cwd: None,
            validation_command: None,
            expected_output_pattern: None,
            fallback_commands: vec![],
            depends_on: vec![],
            requires_human_judgment: false,
            expect_exit_code: 0,
            is_test_step: false,
            validates_step: None,
        }
    }

    fn low_risk_batch() -> super::super::model::Batch {
        Batch {
            id: "b2".to_string(),
            description: String::new(),
            requires_approval: false,
            risk_summary: RiskLevel::Low,
            steps: vec![plan_step("s1")],
        }
    }

    #[test]
    fn batch_approval_required_when_checkpoint_enabled_and_standard_trust() {
        let mut state = ExecutionState::new("issue");
        state.plan = Some(ExecutionPlan {
            summary: String::new(),
            rationale: None,
            batches: vec![low_risk_batch()],
            total_estimated_minutes: 0,
            tdd_approach: false,
        });
        let p = profile(TrustLevel::Standard, true);
        assert!(requires_batch_approval(&p, &state));
    }

    #[test]
    fn batch_approval_skipped_when_checkpoint_disabled() {
        let mut state = ExecutionState::new("issue");
        state.plan = Some(ExecutionPlan {
            summary: String::new(),
            rationale: None,
            batches: vec![low_risk_batch()],
            total_estimated_minutes: 0,
            tdd_approach: false,
        });
        let p = profile(TrustLevel::Standard, false);
        assert!(!requires_batch_approval(&p, &state));
    }

    #[test]
    fn batch_approval_skipped_for_autonomous_low_risk() {
        let mut state = ExecutionState::new("issue");
        state.plan = Some(ExecutionPlan {
            summary: String::new(),
            rationale: None,
            batches: vec![low_risk_batch()],
            total_estimated_minutes: 0,
            tdd_approach: false,
        });
        let p = profile(TrustLevel::Autonomous, true);
        assert!(!requires_batch_approval(&p, &state));
    }

    #[test]
    fn oversized_low_risk_batch_splits_five_and_one() {
        let steps: Vec<PlanStep> = (1..=6).map(|i| plan_step(&format!("s{i}"))).collect();
        let mut plan = ExecutionPlan {
            summary: String::new(),
            rationale: None,
            batches: vec![Batch {
                id: "b1".to_string(),
                description: String::new(),
                requires_approval: false,
                risk_summary: RiskLevel::Low,
                steps,
            }],
            total_estimated_minutes: 0,
            tdd_approach: false,
        };

        let warnings = enforce_batch_size_limits(&mut plan);

        assert_eq!(warnings.len(), 1);
        assert_eq!(plan.batches.len(), 2);
        assert_eq!(plan.batches[0].id, "b1-1");
        assert_eq!(plan.batches[0].steps.len(), 5);
        assert_eq!(plan.batches[1].id, "b1-2");
        assert_eq!(plan.batches[1].steps.len(), 1);
    }

    #[test]
    fn high_risk_batch_with_two_steps_splits_into_singletons() {
        let mut plan = ExecutionPlan {
            summary: String::new(),
            rationale: None,
            batches: vec![Batch {
                id: "b1".to_string(),
                description: String::new(),
                requires_approval: false,
                risk_summary: RiskLevel::High,
                steps: vec![
                    PlanStep { risk_level: RiskLevel::High, ..plan_step("s1") },
                    PlanStep { risk_level: RiskLevel::High, ..plan_step("s2") },
                ],
            }],
            total_estimated_minutes: 0,
            tdd_approach: false,
        };

        enforce_batch_size_limits(&mut plan);

        assert_eq!(plan.batches.len(), 2);
        assert!(plan.batches.iter().all(|b| b.steps.len() == 1));
    }

    #[test]
    fn synthesize_fix_batch_builds_one_step_per_requested_change() {
        let review = ReviewResult {
            approved: false,
            feedback: "needs work".to_string(),
            requested_changes: vec!["fix error handling".to_string(), "add a test".to_string()],
        };

        let batch = synthesize_fix_batch(&review, 1);

        assert_eq!(batch.steps.len(), 2);
        assert!(batch.steps.iter().all(|s| s.requires_human_judgment));
        assert_eq!(batch.steps[0].description, "fix error handling");
        assert_eq!(batch.steps[1].description, "add a test");
    }

    #[test]
    fn synthesize_fix_batch_falls_back_to_feedback_when_no_itemized_changes() {
        let review = ReviewResult {
            approved: false,
            feedback: "overall needs polish".to_string(),
            requested_changes: vec![],
        };

        let batch = synthesize_fix_batch(&review, 2);

        assert_eq!(batch.steps.len(), 1);
        assert_eq!(batch.steps[0].description, "overall needs polish");
    }
}
