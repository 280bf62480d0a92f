//! Repository pattern implementations for database access
//!
//! This module provides repository structs for managing database operations
//! on all core entities: tasks, workflows, tool executions, and configurations.

pub mod task_repo;
pub mod workflow_repo;
pub mod tool_execution_repo;
pub mod configuration_repo;
pub mod event_repo;
pub mod token_usage_repo;

// Re-export all repositories for convenient access
pub use task_repo::TaskRepository;
pub use workflow_repo::{ListCursor, WorkflowRepository};
pub use tool_execution_repo::ToolExecutionRepository;
pub use configuration_repo::ConfigurationRepository;
pub use event_repo::EventRepository;
pub use token_usage_repo::{TokenUsageRepository, UsageTrend, UsageTrendDay, UsageTrendModel};
