//! Contract consumed by `architect`/`reviewer`/`developer` nodes: produce
//! structured output from a prompt, and run an open-ended agentic session
//! against a working directory.
//!
//! `LlmDriver` implements it over `langgraph_core::llm::ChatModel`
//! (the trait every provider in the `llm` crate already implements),
//! wrapping an `llm`-crate client behind a narrower orchestrator-local trait.

use crate::workflow::model::{BatchResult, ExecutionPlan, ReviewResult};
use async_trait::async_trait;
use langgraph_core::llm::{ChatModel, ChatRequest};
use langgraph_core::Message;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("driver call failed: {0}")]
    Call(String),
    #[error("driver returned output that does not match the expected schema: {0}")]
    MalformedOutput(String),
}

/// Narrow seam between the graph and whatever produces plans/reviews/agentic
/// execution. The core depends only on this contract, never on a concrete
/// provider, per SPEC_FULL.md's "LLM driver" Non-goal boundary.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Ask the architect stage's model for an execution plan.
    async fn generate_plan(&self, issue: &str, instructions: &[String]) -> Result<ExecutionPlan, DriverError>;

    /// Ask the reviewer stage's model to judge the accumulated batch results.
    async fn review_changes(&self, issue: &str, batch_results: &[BatchResult]) -> Result<ReviewResult, DriverError>;

    /// Run an open-ended agentic session (used by the batch executor's
    /// high-risk semantic pre-validation and by free-form fix instructions).
    /// Returns the session's final textual output.
    async fn execute_agentic(&self, prompt: &str, cwd: &str) -> Result<String, DriverError>;
}

pub struct LlmDriver {
    model: Arc<dyn ChatModel>,
}

impl LlmDriver {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    async fn ask(&self, prompt: String) -> Result<String, DriverError> {
        let request = ChatRequest::new(vec![Message::human(prompt)]);
        let response = self
            .model
            .chat(request)
            .await
            .map_err(|e| DriverError::Call(e.to_string()))?;
        response
            .message
            .text()
            .map(|s| s.to_string())
            .ok_or_else(|| DriverError::MalformedOutput("empty assistant message".to_string()))
    }
}

#[async_trait]
impl Driver for LlmDriver {
    async fn generate_plan(&self, issue: &str, instructions: &[String]) -> Result<ExecutionPlan, DriverError> {
        let mut prompt = format!(
            "Produce a JSON execution plan for the following issue.\n\nIssue:\n{issue}\n\n\
             Respond with a single JSON object matching this shape: \
             {{\"summary\": string, \"rationale\": string|null, \"batches\": [{{\"id\": string, \
             \"description\": string, \"requires_approval\": bool, \"steps\": [...]}}]}}."
        );
        if !instructions.is_empty() {
            prompt.push_str("\n\nAdditional instructions from prior runs:\n");
            prompt.push_str(&instructions.join("\n"));
        }

        let text = self.ask(prompt).await?;
        serde_json::from_str(&text).map_err(|e| DriverError::MalformedOutput(e.to_string()))
    }

    async fn review_changes(&self, issue: &str, batch_results: &[BatchResult]) -> Result<ReviewResult, DriverError> {
        let results_json = serde_json::to_string(batch_results)
            .map_err(|e| DriverError::MalformedOutput(e.to_string()))?;
        let prompt = format!(
            "Review the changes made for this issue and decide whether they satisfy it.\n\n\
             Issue:\n{issue}\n\nBatch results:\n{results_json}\n\n\
             Respond with a single JSON object: {{\"approved\": bool, \"feedback\": string, \
             \"requested_changes\": [string]}}."
        );
        let text = self.ask(prompt).await?;
        serde_json::from_str(&text).map_err(|e| DriverError::MalformedOutput(e.to_string()))
    }

    async fn execute_agentic(&self, prompt: &str, cwd: &str) -> Result<String, DriverError> {
        let scoped = format!("Working directory: {cwd}\n\n{prompt}");
        self.ask(scoped).await
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// Scripted fake driver for graph/executor tests that don't need a real
    /// model round-trip.
    pub struct FakeDriver {
        pub plan: ExecutionPlan,
        pub review: ReviewResult,
    }

    #[async_trait]
    impl Driver for FakeDriver {
        async fn generate_plan(&self, _issue: &str, _instructions: &[String]) -> Result<ExecutionPlan, DriverError> {
            Ok(self.plan.clone())
        }

        async fn review_changes(&self, _issue: &str, _batch_results: &[BatchResult]) -> Result<ReviewResult, DriverError> {
            Ok(self.review.clone())
        }

        async fn execute_agentic(&self, prompt: &str, _cwd: &str) -> Result<String, DriverError> {
            Ok(format!("ok: {prompt}"))
        }
    }
}
