//! Blocker resolution protocol
//!
//! When a batch comes back with failed steps the graph routes into
//! `blocker_resolution_node` and waits (the workflow moves to
//! [`super::state_machine::WorkflowStatus::Blocked`]) for a human to call
//! [`apply_resolution`] with one of the four [`BlockerResolution`] variants.

use super::model::{Batch, BlockerResolution, ExecutionPlan, GitSnapshotBeforeBatch};
use super::state::ExecutionState;
use std::collections::HashSet;

/// Fixed-point expansion of a skip set: any step whose `depends_on` intersects
/// the already-skipped set is itself skipped, repeated until nothing new is
/// added. Grounded in the iterative `get_cascade_skips` sweep over the whole
/// plan rather than a single-batch scan, since a dependent step can live in a
/// later batch.
pub fn cascade_skips(plan: &ExecutionPlan, seed: &[String]) -> HashSet<String> {
    let mut skipped: HashSet<String> = seed.iter().cloned().collect();
    loop {
        let mut added = false;
        for step in plan.batches.iter().flat_map(|b: &Batch| b.steps.iter()) {
            if skipped.contains(&step.id) {
                continue;
            }
            if step.depends_on.iter().any(|d| skipped.contains(d)) {
                skipped.insert(step.id.clone());
                added = true;
            }
        }
        if !added {
            break;
        }
    }
    skipped
}

/// Outcome of applying a resolution, telling the graph what to do next.
pub enum ResolutionEffect {
    /// Resume execution at the next ready batch.
    Resume,
    /// Abort without touching the worktree.
    Abort,
    /// Abort and, if a pre-batch snapshot was taken, the caller must revert
    /// batch-changed files to it. `None` means no snapshot existed (no batch
    /// had started yet) and the worktree is left untouched.
    AbortAndRevert { snapshot: Option<GitSnapshotBeforeBatch> },
}

/// Apply a human's blocker resolution to the execution state.
///
/// `skip` marks the failed steps (and anything cascading from them) skipped
/// and clears the blocker so the graph can resume. `abort`/`abort_revert`
/// leave the state untouched for audit purposes beyond clearing the blocker,
/// the caller is responsible for the accompanying state-machine transition to
/// `aborted`. A free-form instruction is appended to `pending_instructions`
/// and treated the same as `skip` for control flow (resume into the developer
/// node with the new context).
pub fn apply_resolution(
    state: &mut ExecutionState,
    plan: &ExecutionPlan,
    resolution: BlockerResolution,
) -> ResolutionEffect {
    let blocker = state.blocker.clone();

    match resolution {
        BlockerResolution::Skip => {
            if let Some(report) = &blocker {
                let skipped = cascade_skips(plan, &report.failed_step_ids);
                state.skipped_step_ids.extend(skipped);
            }
            state.blocker = None;
            ResolutionEffect::Resume
        }
        BlockerResolution::Instruction { text } => {
            state.pending_instructions.push(text);
            state.blocker = None;
            ResolutionEffect::Resume
        }
        BlockerResolution::Abort => {
            state.blocker = None;
            ResolutionEffect::Abort
        }
        BlockerResolution::AbortRevert => {
            let snapshot = state.pre_batch_snapshot.clone();
            state.blocker = None;
            ResolutionEffect::AbortAndRevert { snapshot }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::{ActionType, PlanStep, RiskLevel};

    fn step(id: &str, deps: &[&str]) -> PlanStep {
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
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            requires_human_judgment: false,
            expect_exit_code: 0,
            is_test_step: false,
            validates_step: None,
        }
    }

    fn plan() -> ExecutionPlan {
        ExecutionPlan {
            summary: "test".to_string(),
            rationale: None,
            batches: vec![Batch {
                id: "b1".to_string(),
                description: String::new(),
                requires_approval: false,
                risk_summary: RiskLevel::Low,
                steps: vec![
                    step("a", &[]),
                    step("b", &["a"]),
                    step("c", &["b"]),
                    step("d", &[]),
                ],
            }],
            total_estimated_minutes: 0,
            tdd_approach: false,
        }
    }

    #[test]
    fn cascade_skips_propagates_transitively() {
        let p = plan();
        let skipped = cascade_skips(&p, &["a".to_string()]);
        assert!(skipped.contains("a"));
        assert!(skipped.contains("b"));
        assert!(skipped.contains("c"));
        assert!(!skipped.contains("d"));
    }

    #[test]
    fn skip_resolution_clears_blocker_and_resumes() {
        use crate::workflow::model::BlockerReport;
        let p = plan();
        let mut state = ExecutionState::new("issue");
        state.blocker = Some(BlockerReport {
            batch_id: "b1".to_string(),
            failed_step_ids: vec!["a".to_string()],
            reason: "boom".to_string(),
        });

        let effect = apply_resolution(&mut state, &p, BlockerResolution::Skip);
        assert!(matches!(effect, ResolutionEffect::Resume));
        assert!(state.blocker.is_none());
        assert!(state.skipped_step_ids.contains("b"));
    }

    #[test]
    fn abort_revert_surfaces_snapshot_commit() {
        let p = plan();
        let mut state = ExecutionState::new("issue");
        state.pre_batch_snapshot = Some(crate::workflow::model::GitSnapshotBeforeBatch {
            batch_id: "b1".to_string(),
            commit_hash: "deadbeef".to_string(),
            dirty_files: Vec::new(),
            stash_ref: None,
        });

        let effect = apply_resolution(&mut state, &p, BlockerResolution::AbortRevert);
        match effect {
            ResolutionEffect::AbortAndRevert { snapshot } => {
                assert_eq!(snapshot.unwrap().commit_hash, "deadbeef")
            }
            _ => panic!("expected AbortAndRevert"),
        }
    }
}
