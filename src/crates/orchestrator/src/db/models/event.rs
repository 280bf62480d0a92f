//! Workflow event model for database persistence

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Persisted row backing [`crate::events::model::WorkflowEvent`]. Kept as its
/// own row type (rather than reusing the in-memory event directly) since
/// `data`/`correlation_id` round-trip as JSON/TEXT columns the way every
/// other model in this module does.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventRow {
    /// Unique event identifier (UUID string)
    pub id: String,

    /// Workflow this event belongs to
    pub workflow_id: String,

    /// Monotonic per-workflow sequence number, starting at 1
    pub sequence: i64,

    /// Event timestamp (ISO8601 string)
    pub timestamp: String,

    /// Label of the agent/stage that raised the event
    pub agent: String,

    /// Event type, serialized as its snake_case variant name
    pub event_type: String,

    /// Event level: trace, debug, info
    pub level: String,

    pub message: String,

    /// Structured payload (JSON string, optional)
    pub data: Option<String>,

    pub correlation_id: Option<String>,
}
