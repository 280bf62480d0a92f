//! Workflow repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::Workflow;
use crate::workflow::graph::checked_transition;
use crate::workflow::state::ExecutionState;
use crate::workflow::WorkflowStatus;
use crate::OrchestratorError;
use chrono::Utc;

/// Opaque pagination cursor: `(created_at, id)` of the last row returned.
#[derive(Debug, Clone)]
pub struct ListCursor {
    pub created_at: String,
    pub id: String,
}

/// Workflow repository for managing workflow database operations
pub struct WorkflowRepository;

impl WorkflowRepository {
    /// Insert a new workflow. Fails (via the table's primary key) if `id` collides.
    pub async fn create(pool: &DatabasePool, workflow: &Workflow) -> Result<Workflow, sqlx::Error> {
        sqlx::query_as::<_, Workflow>(
            "INSERT INTO workflows
                (id, issue_id, worktree_path, worktree_name, profile_id, status, plan_only,
                 external_plan, current_stage, plan_json, state_json, failure_reason, recoverable,
                 created_at, started_at, completed_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&workflow.id)
        .bind(&workflow.issue_id)
        .bind(&workflow.worktree_path)
        .bind(&workflow.worktree_name)
        .bind(&workflow.profile_id)
        .bind(&workflow.status)
        .bind(workflow.plan_only)
        .bind(workflow.external_plan)
        .bind(&workflow.current_stage)
        .bind(&workflow.plan_json)
        .bind(&workflow.state_json)
        .bind(&workflow.failure_reason)
        .bind(workflow.recoverable)
        .bind(&workflow.created_at)
        .bind(&workflow.started_at)
        .bind(&workflow.completed_at)
        .bind(&workflow.updated_at)
        .fetch_one(pool)
        .await
    }

    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<Workflow>, sqlx::Error> {
        sqlx::query_as::<_, Workflow>("SELECT * FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The one non-terminal workflow for a worktree, if any (enforced at the
    /// database level by `idx_workflows_worktree_active`).
    pub async fn get_by_worktree(pool: &DatabasePool, worktree_path: &str) -> Result<Option<Workflow>, sqlx::Error> {
        sqlx::query_as::<_, Workflow>(
            "SELECT * FROM workflows
             WHERE worktree_path = ?
               AND status NOT IN ('completed', 'failed', 'cancelled', 'aborted')",
        )
        .bind(worktree_path)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_active(pool: &DatabasePool) -> Result<Vec<Workflow>, sqlx::Error> {
        sqlx::query_as::<_, Workflow>(
            "SELECT * FROM workflows
             WHERE status NOT IN ('completed', 'failed', 'cancelled', 'aborted')
             ORDER BY created_at DESC",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn list_by_status(pool: &DatabasePool, status: WorkflowStatus) -> Result<Vec<Workflow>, sqlx::Error> {
        sqlx::query_as::<_, Workflow>("SELECT * FROM workflows WHERE status = ? ORDER BY created_at DESC")
            .bind(status.as_str())
            .fetch_all(pool)
            .await
    }

    /// Paginated listing, newest first. `cursor` (if given) excludes rows at
    /// or after the cursor's position; `limit` bounds the page size.
    pub async fn list(
        pool: &DatabasePool,
        status: Option<WorkflowStatus>,
        limit: i64,
        cursor: Option<ListCursor>,
    ) -> Result<Vec<Workflow>, sqlx::Error> {
        match (status, cursor) {
            (Some(status), Some(cursor)) => {
                sqlx::query_as::<_, Workflow>(
                    "SELECT * FROM workflows
                     WHERE status = ? AND (created_at, id) < (?, ?)
                     ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(status.as_str())
                .bind(cursor.created_at)
                .bind(cursor.id)
                .bind(limit)
                .fetch_all(pool)
                .await
            }
            (Some(status), None) => {
                sqlx::query_as::<_, Workflow>(
                    "SELECT * FROM workflows WHERE status = ? ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(pool)
                .await
            }
            (None, Some(cursor)) => {
                sqlx::query_as::<_, Workflow>(
                    "SELECT * FROM workflows WHERE (created_at, id) < (?, ?) ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(cursor.created_at)
                .bind(cursor.id)
                .bind(limit)
                .fetch_all(pool)
                .await
            }
            (None, None) => {
                sqlx::query_as::<_, Workflow>("SELECT * FROM workflows ORDER BY created_at DESC, id DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(pool)
                    .await
            }
        }
    }

    /// Validate the transition against `state_machine::validate_transition`
    /// before persisting, atomically with the row update.
    pub async fn set_status(
        pool: &DatabasePool,
        id: &str,
        to: WorkflowStatus,
        failure_reason: Option<&str>,
    ) -> Result<Workflow, OrchestratorError> {
        let current = Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| OrchestratorError::WorkflowNotFound(id.to_string()))?;

        let from = current
            .status()
            .ok_or_else(|| OrchestratorError::General(format!("unparseable workflow status: {}", current.status)))?;

        checked_transition(from, to)?;

        let now = Utc::now().to_rfc3339();
        let started_at = if from == WorkflowStatus::Planning && to != WorkflowStatus::Planning {
            Some(now.clone())
        } else {
            current.started_at.clone()
        };
        let completed_at = if to.is_terminal() { Some(now.clone()) } else { current.completed_at.clone() };

        let updated = sqlx::query_as::<_, Workflow>(
            "UPDATE workflows
             SET status = ?, failure_reason = ?, started_at = ?, completed_at = ?, updated_at = ?
             WHERE id = ?
             RETURNING *",
        )
        .bind(to.as_str())
        .bind(failure_reason)
        .bind(started_at)
        .bind(completed_at)
        .bind(&now)
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(updated)
    }

    /// Persist the graph's current stage, plan, and state after a node runs.
    pub async fn save_state(
        pool: &DatabasePool,
        id: &str,
        state: &ExecutionState,
    ) -> Result<(), OrchestratorError> {
        let state_json = serde_json::to_string(state)?;
        let plan_json = state.plan.as_ref().map(serde_json::to_string).transpose()?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE workflows SET current_stage = ?, plan_json = ?, state_json = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&state.current_stage)
        .bind(plan_json)
        .bind(state_json)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn load_state(pool: &DatabasePool, id: &str) -> Result<Option<ExecutionState>, OrchestratorError> {
        let workflow = Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| OrchestratorError::WorkflowNotFound(id.to_string()))?;

        match workflow.state_json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn count_active(pool: &DatabasePool) -> Result<i64, sqlx::Error> {
        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM workflows WHERE status NOT IN ('completed', 'failed', 'cancelled', 'aborted')",
        )
        .fetch_one(pool)
        .await?;
        Ok(result.0)
    }

    pub async fn count_by_status(pool: &DatabasePool, status: WorkflowStatus) -> Result<i64, sqlx::Error> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workflows WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(pool)
            .await?;
        Ok(result.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> sqlx::sqlite::SqlitePool {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:").await.unwrap();

        sqlx::query(
            "CREATE TABLE workflows (
                id TEXT PRIMARY KEY NOT NULL,
                issue_id TEXT NOT NULL,
                worktree_path TEXT NOT NULL,
                worktree_name TEXT NOT NULL,
                profile_id TEXT NOT NULL DEFAULT 'default',
                status TEXT NOT NULL DEFAULT 'planning',
                plan_only INTEGER NOT NULL DEFAULT 0,
                external_plan INTEGER NOT NULL DEFAULT 0,
                current_stage TEXT NOT NULL DEFAULT 'architect',
                plan_json TEXT,
                state_json TEXT,
                failure_reason TEXT,
                recoverable INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    fn workflow(id: &str, worktree: &str) -> Workflow {
        Workflow::new(id.to_string(), "ISSUE-1".to_string(), worktree.to_string(), "branch".to_string(), "default".to_string())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let pool = setup_db().await;
        let created = WorkflowRepository::create(&pool, &workflow("wf-1", "/tmp/a")).await.unwrap();
        assert_eq!(created.status, "planning");

        let fetched = WorkflowRepository::get_by_id(&pool, "wf-1").await.unwrap().unwrap();
        assert_eq!(fetched.worktree_path, "/tmp/a");
    }

    #[tokio::test]
    async fn test_get_by_worktree_ignores_terminal_workflows() {
        let pool = setup_db().await;
        WorkflowRepository::create(&pool, &workflow("wf-1", "/tmp/a")).await.unwrap();
        WorkflowRepository::set_status(&pool, "wf-1", WorkflowStatus::Cancelled, None).await.unwrap();

        assert!(WorkflowRepository::get_by_worktree(&pool, "/tmp/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_status_validates_transition() {
        let pool = setup_db().await;
        WorkflowRepository::create(&pool, &workflow("wf-1", "/tmp/a")).await.unwrap();

        let err = WorkflowRepository::set_status(&pool, "wf-1", WorkflowStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_set_status_happy_path_sets_started_at() {
        let pool = setup_db().await;
        WorkflowRepository::create(&pool, &workflow("wf-1", "/tmp/a")).await.unwrap();

        let updated = WorkflowRepository::set_status(&pool, "wf-1", WorkflowStatus::Pending, None).await.unwrap();
        assert_eq!(updated.status, "pending");
        assert!(updated.started_at.is_some());
    }

    #[tokio::test]
    async fn test_save_and_load_state() {
        let pool = setup_db().await;
        WorkflowRepository::create(&pool, &workflow("wf-1", "/tmp/a")).await.unwrap();

        let state = ExecutionState::new("fix the bug");
        WorkflowRepository::save_state(&pool, "wf-1", &state).await.unwrap();

        let loaded = WorkflowRepository::load_state(&pool, "wf-1").await.unwrap().unwrap();
        assert_eq!(loaded.issue, "fix the bug");
    }

    #[tokio::test]
    async fn test_count_active() {
        let pool = setup_db().await;
        WorkflowRepository::create(&pool, &workflow("wf-1", "/tmp/a")).await.unwrap();
        WorkflowRepository::create(&pool, &workflow("wf-2", "/tmp/b")).await.unwrap();
        WorkflowRepository::set_status(&pool, "wf-2", WorkflowStatus::Cancelled, None).await.unwrap();

        assert_eq!(WorkflowRepository::count_active(&pool).await.unwrap(), 1);
    }
}
