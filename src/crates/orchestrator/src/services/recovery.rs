//! Startup reconciliation and periodic retention cleanup.
//!
//! A workflow's `in_progress` status means a graph step was running in some
//! process's memory; if the server restarts, that in-flight state is gone
//! and the row is stale. `blocked`/`pending` workflows, by contrast, are
//! durable: their `state_json` already carries everything needed to resume,
//! so they're left alone and just re-announced for any client that missed
//! the original event.

use std::sync::Arc;
use std::time::Duration;

use crate::db::connection::DatabasePool;
use crate::db::repositories::WorkflowRepository;
use crate::events::bus::EventBus;
use crate::events::model::{EventLevel, EventType};
use crate::workflow::WorkflowStatus;
use crate::OrchestratorError;

/// Mark every `in_progress` workflow `failed(recoverable=true)` and
/// re-announce every `blocked` workflow. Call once, before serving traffic.
pub async fn reconcile_on_startup(pool: &DatabasePool, events: &EventBus) -> Result<(), OrchestratorError> {
    let orphaned = WorkflowRepository::list_by_status(pool, WorkflowStatus::InProgress).await?;
    for workflow in orphaned {
        WorkflowRepository::set_status(
            pool,
            &workflow.id,
            WorkflowStatus::Failed,
            Some("server restarted while workflow was running"),
        )
        .await?;
        tracing::warn!(workflow_id = %workflow.id, "marked orphaned in-progress workflow failed on startup");
        events
            .emit_workflow(
                &workflow.id,
                "orchestrator",
                EventType::WorkflowFailed,
                EventLevel::Info,
                "server restarted while workflow was running".to_string(),
                Some(serde_json::json!({"recoverable": true})),
            )
            .await;
    }

    let blocked = WorkflowRepository::list_by_status(pool, WorkflowStatus::Blocked).await?;
    for workflow in blocked {
        events
            .emit_workflow(
                &workflow.id,
                "orchestrator",
                EventType::ApprovalRequired,
                EventLevel::Info,
                "workflow awaiting blocker resolution".to_string(),
                None,
            )
            .await;
    }

    Ok(())
}

/// Spawn a background task that periodically purges events older than each
/// profile's retention window. Runs forever; abort the returned handle on
/// shutdown.
pub fn spawn_retention_sweep(
    pool: Arc<DatabasePool>,
    retention_days: u32,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match crate::db::repositories::EventRepository::delete_older_than(&pool, retention_days).await {
                Ok(deleted) if deleted > 0 => {
                    tracing::info!(deleted, retention_days, "purged expired workflow events");
                }
                Ok(_) => {}
                Err(e) => tracing::error!("event retention sweep failed: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::DatabaseConnection;
    use crate::db::models::Workflow;
    use crate::workflow::state::ExecutionState;

    async fn test_db() -> DatabaseConnection {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    #[tokio::test]
    async fn reconcile_fails_orphaned_in_progress_workflows() {
        let db = test_db().await;
        let pool = db.pool();
        let events = EventBus::new(None);

        let workflow = Workflow::new(
            "wf-1".to_string(),
            "ISSUE-1".to_string(),
            "/tmp/wt".to_string(),
            "wt".to_string(),
            "default".to_string(),
        );
        let created = WorkflowRepository::create(pool, &workflow).await.unwrap();
        WorkflowRepository::save_state(pool, &created.id, &ExecutionState::new("fix it")).await.unwrap();
        WorkflowRepository::set_status(pool, &created.id, WorkflowStatus::Pending, None).await.unwrap();
        WorkflowRepository::set_status(pool, &created.id, WorkflowStatus::InProgress, None).await.unwrap();

        reconcile_on_startup(pool, &events).await.unwrap();

        let reloaded = WorkflowRepository::get_by_id(pool, &created.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status(), Some(WorkflowStatus::Failed));
        assert_eq!(reloaded.failure_reason.as_deref(), Some("server restarted while workflow was running"));
    }

    #[tokio::test]
    async fn reconcile_leaves_blocked_workflows_untouched() {
        let db = test_db().await;
        let pool = db.pool();
        let events = EventBus::new(None);

        let workflow = Workflow::new(
            "wf-2".to_string(),
            "ISSUE-2".to_string(),
            "/tmp/wt2".to_string(),
            "wt2".to_string(),
            "default".to_string(),
        );
        let created = WorkflowRepository::create(pool, &workflow).await.unwrap();
        WorkflowRepository::save_state(pool, &created.id, &ExecutionState::new("fix it")).await.unwrap();
        WorkflowRepository::set_status(pool, &created.id, WorkflowStatus::Pending, None).await.unwrap();
        WorkflowRepository::set_status(pool, &created.id, WorkflowStatus::InProgress, None).await.unwrap();
        WorkflowRepository::set_status(pool, &created.id, WorkflowStatus::Blocked, None).await.unwrap();

        reconcile_on_startup(pool, &events).await.unwrap();

        let reloaded = WorkflowRepository::get_by_id(pool, &created.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status(), Some(WorkflowStatus::Blocked));
    }
}
