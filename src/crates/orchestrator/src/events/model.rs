//! Event shapes for the workflow event bus
//!
//! Named and tagged the way `api::ws::events::RealtimeEvent` tags its
//! variants (`#[serde(tag = "type")]`), generalized from that module's
//! task/tool/workflow event grab-bag to the closed set of stages this
//! domain actually emits.

use crate::workflow::model::ReviewResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Trace,
    Debug,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
    StageStarted,
    StageCompleted,
    ApprovalRequired,
    ApprovalGranted,
    ApprovalRejected,
    FileCreated,
    FileModified,
    FileDeleted,
    ReviewRequested,
    ReviewCompleted,
    RevisionRequested,
    AgentMessage,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    SystemError,
    SystemWarning,
    /// Ephemeral streaming payload; see [`StreamEventSubtype`]. Always `trace`.
    Stream,
}

impl EventType {
    /// The level a caller should use when it has no more specific judgment to
    /// make, per the closed event-type/level mapping: workflow lifecycle,
    /// stage, approval and review-completion events are `info`; task/file
    /// events, agent messages and warnings are `debug`; `stream` is `trace`.
    /// `system_error` is classified `info` so operators see it without
    /// enabling debug-level retention.
    pub fn default_level(&self) -> EventLevel {
        use EventType::*;
        match self {
            WorkflowStarted | WorkflowCompleted | WorkflowFailed | WorkflowCancelled
            | StageStarted | StageCompleted
            | ApprovalRequired | ApprovalGranted | ApprovalRejected
            | ReviewCompleted
            | SystemError => EventLevel::Info,
            FileCreated | FileModified | FileDeleted
            | ReviewRequested | RevisionRequested
            | AgentMessage
            | TaskStarted | TaskCompleted | TaskFailed
            | SystemWarning => EventLevel::Debug,
            Stream => EventLevel::Trace,
        }
    }
}

/// A persisted, append-only record of something that happened during a
/// workflow run. Sequence numbers are issued by
/// [`crate::db::repositories::EventRepository::append`] and are contiguous
/// per workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub id: String,
    pub workflow_id: String,
    pub sequence: i64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub agent: String,
    pub event_type: EventType,
    pub level: EventLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Ephemeral sub-type for fine-grained streaming, persisted only when trace
/// retention is enabled (see [`super::bus::EventBus::configure`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventSubtype {
    Thinking,
    ToolCall,
    ToolResult,
    AgentOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub workflow_id: String,
    pub agent: String,
    pub subtype: StreamEventSubtype,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<serde_json::Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Convenience payload for the blocker/approval-required stream, carrying
/// the review verdict alongside the generic event when one is relevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEventData {
    pub review: ReviewResult,
}
