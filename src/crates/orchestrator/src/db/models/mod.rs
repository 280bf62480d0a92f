//! Database models
//!
//! Core data models for persistent storage in the orchestrator database.
//! All timestamp fields are stored as ISO8601 strings (TEXT in SQLite) due to
//! sqlx and SQLite type limitations with chrono::DateTime<Utc>.

pub mod task;
pub mod workflow;
pub mod tool_execution;
pub mod configuration;
pub mod event;
pub mod token_usage;

pub use task::Task;
pub use workflow::Workflow;
pub use tool_execution::ToolExecution;
pub use configuration::Configuration;
pub use event::EventRow;
pub use token_usage::TokenUsageRow;
