//! Workflow orchestration: plan → approve → execute-in-batches → review → fix
//!
//! `model` holds the shared data types, `state_machine` the status transition
//! matrix, `state` the in-flight execution state threaded through the graph,
//! `blocker` the blocker cascade/resolution logic, and `graph` the step
//! function that ties them together.

pub mod blocker;
pub mod graph;
pub mod model;
pub mod state;
pub mod state_machine;

pub use blocker::{apply_resolution, cascade_skips, ResolutionEffect};
pub use graph::{step, GraphContext, NodeOutcome};
pub use model::{
    ActionType, Batch, BatchApproval, BatchResult, BlockerReport, BlockerResolution, DeveloperStatus,
    ExecutionPlan, GitSnapshotBeforeBatch, PlanStep, ReviewResult, RiskLevel, StepResult,
};
pub use state::ExecutionState;
pub use state_machine::WorkflowStatus;
