//! Core data model for plan-approve-execute-review workflows
//!
//! A workflow takes an issue description through an architect stage (produce a plan),
//! a human approval gate, batch-by-batch execution against a worktree, and a
//! reviewer/fix loop before landing. These types are the shared vocabulary between
//! the graph engine, the batch executor, the event bus and the workflow store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Risk classification assigned to a single step by the architect.
///
/// Drives how much pre-validation a step receives before execution: low and
/// medium risk steps only get filesystem checks, high risk steps additionally
/// get a semantic check layered on top (see [`crate::executor::batch`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn rank(self) -> u8 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
        }
    }

    /// The more severe of two risk levels.
    pub fn max(self, other: RiskLevel) -> RiskLevel {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    fn lowest() -> RiskLevel {
        RiskLevel::Low
    }

    /// Highest risk level among `steps`, or `Low` for an empty batch.
    pub fn of_steps(steps: &[PlanStep]) -> RiskLevel {
        steps.iter().fold(RiskLevel::Low, |acc, s| acc.max(s.risk_level))
    }
}

/// What kind of action a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Write or modify a source file.
    Code,
    /// Run a shell command.
    Command,
    /// Run an existing validation command without producing new output.
    Validation,
    /// A step that a human must perform; never auto-executed.
    Manual,
}

/// A single unit of work inside a [`Batch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    pub action_type: ActionType,
    pub risk_level: RiskLevel,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_change: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_command: Option<String>,
    /// Regex checked against (ANSI-stripped) command stdout/stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output_pattern: Option<String>,
    /// Alternate commands tried in order if the primary command fails.
    #[serde(default)]
    pub fallback_commands: Vec<String>,
    /// IDs of steps (anywhere in the plan) that must complete before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// A human, not exit-code/pattern checks alone, must judge whether this
    /// step actually succeeded.
    #[serde(default)]
    pub requires_human_judgment: bool,
    /// Exit code a `command`/`validation` step must return to be considered
    /// successful. Checked before `expected_output_pattern`.
    #[serde(default)]
    pub expect_exit_code: i32,
    /// This step only runs tests; it does not itself change production code.
    #[serde(default)]
    pub is_test_step: bool,
    /// For a test step, the id of the step whose change it exercises.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validates_step: Option<String>,
}

/// A group of steps executed together and checkpointed as a unit.
///
/// Batches are the granularity at which a human can pause the workflow
/// (`batch_approval_node`) and at which a VCS snapshot is taken for revert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<PlanStep>,
    /// Require an explicit human approval before this batch executes, independent
    /// of the profile's default batch-checkpoint cadence.
    #[serde(default)]
    pub requires_approval: bool,
    /// Highest risk level among this batch's steps. Set by the architect, or
    /// recomputed by `plan_validator_node` when a batch is split to satisfy
    /// the per-risk batch size limit.
    #[serde(default = "RiskLevel::lowest")]
    pub risk_summary: RiskLevel,
}

impl Batch {
    /// Maximum step count a batch may hold at a given risk level before
    /// `plan_validator_node` splits it: low ≤ 5, medium ≤ 3, high = 1.
    pub fn size_limit_for(risk: RiskLevel) -> usize {
        match risk {
            RiskLevel::Low => 5,
            RiskLevel::Medium => 3,
            RiskLevel::High => 1,
        }
    }
}

/// The architect's output: an ordered list of batches plus free-form rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub summary: String,
    pub batches: Vec<Batch>,
    #[serde(default)]
    pub rationale: Option<String>,
    /// Architect's estimate of total wall-clock minutes to execute every batch.
    #[serde(default)]
    pub total_estimated_minutes: u32,
    /// The plan was designed to write a failing test before the code that
    /// makes it pass (see `PlanStep::is_test_step` / `validates_step`).
    #[serde(default)]
    pub tdd_approach: bool,
}

impl ExecutionPlan {
    /// All step IDs across all batches, in plan order.
    pub fn all_step_ids(&self) -> Vec<&str> {
        self.batches
            .iter()
            .flat_map(|b| b.steps.iter().map(|s| s.id.as_str()))
            .collect()
    }

    pub fn find_step(&self, step_id: &str) -> Option<&PlanStep> {
        self.batches
            .iter()
            .flat_map(|b| b.steps.iter())
            .find(|s| s.id == step_id)
    }

    pub fn batch_of_step(&self, step_id: &str) -> Option<&Batch> {
        self.batches
            .iter()
            .find(|b| b.steps.iter().any(|s| s.id == step_id))
    }

    /// Validate that every `depends_on` reference exists and that the
    /// dependency graph is acyclic. Mirrors the architect-time plan validation
    /// gate (`plan_validator_node`).
    pub fn validate_dag(&self) -> Result<(), String> {
        let ids: std::collections::HashSet<&str> = self.all_step_ids().into_iter().collect();
        for step in self.batches.iter().flat_map(|b| b.steps.iter()) {
            for dep in &step.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(format!(
                        "step {} depends on unknown step {}",
                        step.id, dep
                    ));
                }
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Gray,
            Black,
        }

        let mut marks: HashMap<&str, Mark> = self
            .all_step_ids()
            .into_iter()
            .map(|id| (id, Mark::White))
            .collect();

        fn visit<'a>(
            id: &'a str,
            plan: &'a ExecutionPlan,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), String> {
            match marks.get(id) {
                Some(Mark::Black) => return Ok(()),
                Some(Mark::Gray) => return Err(format!("dependency cycle detected at step {id}")),
                _ => {}
            }
            marks.insert(id, Mark::Gray);
            if let Some(step) = plan.find_step(id) {
                for dep in &step.depends_on {
                    visit(dep.as_str(), plan, marks)?;
                }
            }
            marks.insert(id, Mark::Black);
            Ok(())
        }

        for id in self.all_step_ids() {
            visit(id, self, &mut marks)?;
        }
        Ok(())
    }

    /// Steps with no unmet dependencies among `completed`, ignoring `skipped`.
    pub fn ready_steps(&self, completed: &std::collections::HashSet<String>) -> Vec<&PlanStep> {
        self.batches
            .iter()
            .flat_map(|b| b.steps.iter())
            .filter(|s| !completed.contains(&s.id))
            .filter(|s| s.depends_on.iter().all(|d| completed.contains(d)))
            .collect()
    }
}

/// Terminal outcome of a single step execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeveloperStatus {
    Completed,
    Failed,
    Skipped,
}

/// Result of executing one [`PlanStep`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: DeveloperStatus,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_command: Option<String>,
    pub duration_seconds: f64,
}

/// Snapshot of VCS state taken immediately before a batch starts executing,
/// so that `abort_revert` can restore the worktree exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSnapshotBeforeBatch {
    pub batch_id: String,
    pub commit_hash: String,
    /// Files dirty (modified or untracked) before this batch began. Revert
    /// must leave these untouched — only batch-changed files are restored.
    #[serde(default)]
    pub dirty_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stash_ref: Option<String>,
}

/// Aggregate result of executing a whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: String,
    pub step_results: Vec<StepResult>,
    /// Step IDs that were never attempted because a dependency was skipped
    /// or failed (cascade skip).
    pub cascaded_skips: Vec<String>,
    pub all_succeeded: bool,
}

impl BatchResult {
    pub fn failed_step_ids(&self) -> Vec<&str> {
        self.step_results
            .iter()
            .filter(|r| r.status == DeveloperStatus::Failed)
            .map(|r| r.step_id.as_str())
            .collect()
    }
}

/// A reviewer's verdict on the changes produced so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub approved: bool,
    pub feedback: String,
    #[serde(default)]
    pub requested_changes: Vec<String>,
}

/// How a human chose to resolve a blocked workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BlockerResolution {
    /// Mark the blocking step(s) skipped and cascade-skip dependents, then resume.
    Skip,
    /// Stop the workflow, leaving the worktree as-is.
    Abort,
    /// Stop the workflow and revert the worktree to the pre-batch snapshot.
    AbortRevert,
    /// Free-form instruction fed back to the developer node as new context.
    Instruction { text: String },
}

/// Full record of why a workflow became blocked, surfaced to the human via
/// the `approval_required` / blocker events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockerReport {
    pub batch_id: String,
    pub failed_step_ids: Vec<String>,
    pub reason: String,
}

/// One entry in the append-only batch-approval log
/// (`ExecutionState::batch_approvals`). Invariant: an entry only ever exists
/// for a batch index that actually executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchApproval {
    pub batch_index: usize,
    pub approved: bool,
    #[serde(default)]
    pub feedback: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
