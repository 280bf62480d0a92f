//! API request handlers
//!
//! Provides handler functions for all API endpoints organized by resource.

pub mod health;
pub mod workflows;
pub mod system;
pub mod realtime;

pub use health::{health, health_detailed};
pub use workflows::{
    approve_workflow, cancel_workflow, create_workflow, get_workflow, list_active_workflows,
    list_workflows, reject_workflow, resolve_blocker, start_batch,
};
pub use system::{system_info, system_metrics, status};
pub use realtime::{get_realtime_stats, get_connection_status, get_performance_metrics};
