//! Workflow status transition matrix
//!
//! Mirrors the validation style of [`crate::OrchestratorError::InvalidStateTransition`]:
//! every mutation of a workflow's status goes through [`validate_transition`] first,
//! and terminal states never accept a further transition.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Architect is producing the execution plan.
    Planning,
    /// Waiting on a human decision (plan approval, batch approval, blocker, review gate).
    Pending,
    /// Actively executing a batch or running the review/fix loop.
    InProgress,
    /// Blocked on a failed batch awaiting a blocker resolution.
    Blocked,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully (may be `recoverable`, see [`crate::db::models::Workflow`]).
    Failed,
    /// Cancelled by a human before completion.
    Cancelled,
    /// Aborted via the blocker protocol's `abort`/`abort_revert` resolutions.
    Aborted,
}

impl WorkflowStatus {
    /// Completed, Failed, Cancelled and Aborted never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed
                | WorkflowStatus::Failed
                | WorkflowStatus::Cancelled
                | WorkflowStatus::Aborted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Planning => "planning",
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::InProgress => "in_progress",
            WorkflowStatus::Blocked => "blocked",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
            WorkflowStatus::Aborted => "aborted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "planning" => WorkflowStatus::Planning,
            "pending" => WorkflowStatus::Pending,
            "in_progress" => WorkflowStatus::InProgress,
            "blocked" => WorkflowStatus::Blocked,
            "completed" => WorkflowStatus::Completed,
            "failed" => WorkflowStatus::Failed,
            "cancelled" => WorkflowStatus::Cancelled,
            "aborted" => WorkflowStatus::Aborted,
            _ => return None,
        })
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Allowed `from -> to` edges. Cancellation is allowed from any non-terminal
/// state; every other edge is explicit so that a typo in a new node can't
/// silently widen the transition matrix.
pub fn validate_transition(from: WorkflowStatus, to: WorkflowStatus) -> Result<(), (String, String)> {
    use WorkflowStatus::*;

    if from.is_terminal() {
        return Err((from.to_string(), to.to_string()));
    }

    let allowed = match (from, to) {
        (_, Cancelled) => true,
        (Planning, Pending) => true,
        (Planning, InProgress) => true,
        (Planning, Failed) => true,
        (Pending, InProgress) => true,
        (Pending, Planning) => true,
        (Pending, Failed) => true,
        (InProgress, Pending) => true,
        (InProgress, Blocked) => true,
        (InProgress, Completed) => true,
        (InProgress, Failed) => true,
        (Blocked, InProgress) => true,
        (Blocked, Aborted) => true,
        (Blocked, Failed) => true,
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err((from.to_string(), to.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_reject_any_transition() {
        assert!(validate_transition(WorkflowStatus::Completed, WorkflowStatus::InProgress).is_err());
        assert!(validate_transition(WorkflowStatus::Aborted, WorkflowStatus::Pending).is_err());
    }

    #[test]
    fn cancel_allowed_from_any_non_terminal_state() {
        assert!(validate_transition(WorkflowStatus::Planning, WorkflowStatus::Cancelled).is_ok());
        assert!(validate_transition(WorkflowStatus::Blocked, WorkflowStatus::Cancelled).is_ok());
    }

    #[test]
    fn normal_happy_path() {
        assert!(validate_transition(WorkflowStatus::Planning, WorkflowStatus::Pending).is_ok());
        assert!(validate_transition(WorkflowStatus::Pending, WorkflowStatus::InProgress).is_ok());
        assert!(validate_transition(WorkflowStatus::InProgress, WorkflowStatus::Completed).is_ok());
    }

    #[test]
    fn blocked_requires_resolution_before_progress() {
        assert!(validate_transition(WorkflowStatus::Blocked, WorkflowStatus::InProgress).is_ok());
        assert!(validate_transition(WorkflowStatus::Blocked, WorkflowStatus::Aborted).is_ok());
        assert!(validate_transition(WorkflowStatus::Blocked, WorkflowStatus::Completed).is_err());
    }

    #[test]
    fn round_trip_parse_and_display() {
        for status in [
            WorkflowStatus::Planning,
            WorkflowStatus::Pending,
            WorkflowStatus::InProgress,
            WorkflowStatus::Blocked,
            WorkflowStatus::Completed,
            WorkflowStatus::Failed,
            WorkflowStatus::Cancelled,
            WorkflowStatus::Aborted,
        ] {
            assert_eq!(WorkflowStatus::parse(status.as_str()), Some(status));
        }
    }
}
