//! Workflow lifecycle endpoint handlers: start, approve/reject, resolve a
//! blocker, cancel, and read back state.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::api::{
    error::{ApiError, ApiResult},
    models::{
        ApprovalRequest, CreateWorkflowRequest, ResolveBlockerRequest, StartBatchRequest,
        StartBatchResponse, WorkflowListQuery, WorkflowResponse,
    },
    response,
};
use crate::db::repositories::ListCursor;
use crate::workflow::WorkflowStatus;

/// Start a new workflow run.
///
/// POST /api/workflows
pub async fn create_workflow(
    State(app_state): State<crate::api::routes::AppState>,
    Json(req): Json<CreateWorkflowRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    req.validate()?;
    let worktree_name = req.worktree_name();

    let created = app_state
        .orchestrator
        .start(req.issue_id, req.worktree_path, worktree_name, req.profile, req.plan_only)
        .await?;

    tracing::info!("started workflow: {}", created.id);
    Ok((StatusCode::CREATED, Json(WorkflowResponse::from_db_workflow(created))))
}

/// Start every matching pending workflow.
///
/// POST /api/workflows/start-batch
pub async fn start_batch(
    State(app_state): State<crate::api::routes::AppState>,
    Json(req): Json<StartBatchRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let targets = match req.workflow_ids {
        Some(ids) => ids,
        None => app_state
            .orchestrator
            .list(Some(WorkflowStatus::Pending), 1000, None)
            .await?
            .into_iter()
            .map(|w| w.id)
            .collect(),
    };

    let mut started = Vec::new();
    let mut errors = std::collections::HashMap::new();
    for id in targets {
        match app_state.orchestrator.resume(&id).await {
            Ok(()) => started.push(id),
            Err(e) => {
                errors.insert(id, e.to_string());
            }
        }
    }

    Ok(response::ok(StartBatchResponse { started, errors }))
}

/// List workflows, optionally filtered by status.
///
/// GET /api/workflows
pub async fn list_workflows(
    State(app_state): State<crate::api::routes::AppState>,
    Query(query): Query<WorkflowListQuery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let status = match query.status.as_deref() {
        Some(s) => Some(
            WorkflowStatus::parse(s)
                .ok_or_else(|| ApiError::ValidationError(format!("invalid status filter: {s}")))?,
        ),
        None => None,
    };
    let cursor = query
        .cursor
        .as_deref()
        .map(decode_cursor)
        .transpose()
        .map_err(ApiError::ValidationError)?;

    let workflows = app_state.orchestrator.list(status, limit, cursor).await?;
    let responses: Vec<WorkflowResponse> = workflows.into_iter().map(WorkflowResponse::from_db_workflow).collect();
    Ok(response::ok(responses))
}

/// List only non-terminal workflows.
///
/// GET /api/workflows/active
pub async fn list_active_workflows(
    State(app_state): State<crate::api::routes::AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let workflows = crate::db::repositories::WorkflowRepository::list_active(app_state.db.pool())
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    let responses: Vec<WorkflowResponse> = workflows.into_iter().map(WorkflowResponse::from_db_workflow).collect();
    Ok(response::ok(responses))
}

/// Get a single workflow by ID
///
/// GET /api/workflows/:id
pub async fn get_workflow(
    State(app_state): State<crate::api::routes::AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let workflow = app_state
        .orchestrator
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("workflow not found: {id}")))?;

    Ok(response::ok(WorkflowResponse::from_db_workflow(workflow)))
}

/// Approve a plan or batch awaiting human review.
///
/// POST /api/workflows/:id/approve
pub async fn approve_workflow(
    State(app_state): State<crate::api::routes::AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    app_state.orchestrator.submit_approval(&id, true).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Reject a plan or batch awaiting human review.
///
/// POST /api/workflows/:id/reject
pub async fn reject_workflow(
    State(app_state): State<crate::api::routes::AppState>,
    Path(id): Path<String>,
    Json(_req): Json<ApprovalRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    app_state.orchestrator.submit_approval(&id, false).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Resolve a blocked workflow.
///
/// POST /api/workflows/:id/resolve-blocker
pub async fn resolve_blocker(
    State(app_state): State<crate::api::routes::AppState>,
    Path(id): Path<String>,
    Json(req): Json<ResolveBlockerRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    app_state.orchestrator.resolve_blocker(&id, req.resolution).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Cancel a workflow.
///
/// POST /api/workflows/:id/cancel
pub async fn cancel_workflow(
    State(app_state): State<crate::api::routes::AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let workflow = app_state.orchestrator.cancel(&id).await?;
    Ok(response::ok(WorkflowResponse::from_db_workflow(workflow)))
}

fn decode_cursor(raw: &str) -> Result<ListCursor, String> {
    let (created_at, id) = raw
        .split_once('|')
        .ok_or_else(|| "malformed cursor".to_string())?;
    Ok(ListCursor {
        created_at: created_at.to_string(),
        id: id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_workflow_request_validation() {
        let req = CreateWorkflowRequest {
            issue_id: "ISSUE-1".to_string(),
            worktree_path: "/tmp/worktrees/fix-login".to_string(),
            worktree_name: None,
            profile: None,
            plan_only: false,
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_decode_cursor_roundtrip() {
        let cursor = decode_cursor("2026-01-01T00:00:00Z|wf-1").unwrap();
        assert_eq!(cursor.created_at, "2026-01-01T00:00:00Z");
        assert_eq!(cursor.id, "wf-1");
    }

    #[test]
    fn test_decode_cursor_rejects_malformed() {
        assert!(decode_cursor("no-delimiter").is_err());
    }
}
