//! Orchestration engine for coordinating workflows in acolib
//!
//! This crate provides orchestration capabilities for managing and coordinating
//! complex workflows, tasks, and execution pipelines.

pub mod api;
pub mod config;
pub mod db;
pub mod events;
pub mod executor;
pub mod integration;
pub mod services;
pub mod version;
pub mod workflow;

use thiserror::Error;

/// Errors that can occur during orchestration
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Task not found
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Workflow execution error
    #[error("Workflow execution failed: {0}")]
    ExecutionFailed(String),

    /// Invalid state transition
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// General error
    #[error("Orchestrator error: {0}")]
    General(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A non-terminal workflow already exists for this worktree path.
    #[error("a workflow is already active for worktree {0}")]
    WorkflowConflict(String),

    /// The global or per-profile concurrency cap has been reached.
    #[error("concurrency limit reached: {running} running against a cap of {cap}")]
    ConcurrencyLimit { running: usize, cap: usize },

    /// No workflow exists with the given id.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// A step's command matched an explicit denylist entry.
    #[error("command blocked by policy: {0}")]
    BlockedCommand(String),

    /// A step's command was classified as dangerous by heuristic scanning
    /// (e.g. `rm -rf /`, unscoped `git push --force`).
    #[error("command judged dangerous, refusing to execute: {0}")]
    DangerousCommand(String),

    /// A command string contained shell metacharacters where only a plain
    /// argv was expected (the executor never invokes a shell).
    #[error("command contains disallowed shell metacharacters: {0}")]
    ShellInjection(String),

    /// A step's command binary is not on the configured allowlist.
    #[error("command not on allowlist: {0}")]
    CommandNotAllowed(String),

    /// A step's file path escapes the worktree root.
    #[error("path escapes worktree: {0}")]
    PathTraversal(String),

    /// The external driver's agentic execution stream ended in an error.
    #[error("agentic execution failed: {0}")]
    AgenticExecution(String),

    /// A profile or server configuration value failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Database access failed.
    #[error("database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

impl From<sqlx::Error> for OrchestratorError {
    fn from(e: sqlx::Error) -> Self {
        OrchestratorError::Database(e.into())
    }
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let v = version();
        assert!(!v.is_empty());
    }
}
