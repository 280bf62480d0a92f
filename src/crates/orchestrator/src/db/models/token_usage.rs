//! Token usage model for database persistence
//!
//! One row per token usage observation attributed to a running workflow,
//! feeding the usage-trend report in `db::repositories::token_usage_repo`.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TokenUsageRow {
    pub id: String,
    pub workflow_id: String,

    /// Stage label the usage is attributed to (e.g. "architect", "developer").
    pub node: String,

    pub model: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub estimated_cost_usd: f64,

    /// Recorded timestamp (ISO8601 string)
    pub timestamp: String,
}

impl TokenUsageRow {
    pub fn new(
        workflow_id: impl Into<String>,
        node: impl Into<String>,
        model: impl Into<String>,
        prompt_tokens: i64,
        completion_tokens: i64,
        estimated_cost_usd: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            node: node.into(),
            model: model.into(),
            prompt_tokens,
            completion_tokens,
            estimated_cost_usd,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
