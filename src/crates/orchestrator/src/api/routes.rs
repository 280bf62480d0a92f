//! API route definitions
//!
//! Defines all API routes and their associated handler functions.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::db::DatabaseConnection;
use crate::services::OrchestratorService;
use crate::api::{handlers, ws::BroadcastState};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub broadcast: Arc<BroadcastState>,
    pub orchestrator: OrchestratorService,
}

/// Build the complete API router
pub fn create_router(db: DatabaseConnection, broadcast: Arc<BroadcastState>, orchestrator: OrchestratorService) -> Router {
    let app_state = AppState {
        db: db.clone(),
        broadcast: broadcast.clone(),
        orchestrator,
    };

    Router::new()
        // Health check endpoints
        .route("/health", get(handlers::health))
        .route("/api/health", get(handlers::health))
        // Real-time workflow event stream
        .route("/api/ws", get(crate::api::ws::ws_handler))
        .route(
            "/api/v1/system/health",
            get(handlers::health_detailed),
        )
        // Workflow endpoints
        .route(
            "/api/workflows",
            post(handlers::create_workflow).get(handlers::list_workflows),
        )
        .route("/api/workflows/start-batch", post(handlers::start_batch))
        .route("/api/workflows/active", get(handlers::list_active_workflows))
        .route("/api/workflows/:id", get(handlers::get_workflow))
        .route("/api/workflows/:id/approve", post(handlers::approve_workflow))
        .route("/api/workflows/:id/reject", post(handlers::reject_workflow))
        .route(
            "/api/workflows/:id/resolve-blocker",
            post(handlers::resolve_blocker),
        )
        .route("/api/workflows/:id/cancel", post(handlers::cancel_workflow))
        // System endpoints
        .route(
            "/api/v1/system/info",
            get(handlers::system_info),
        )
        .route(
            "/api/v1/system/metrics",
            get(handlers::system_metrics),
        )
        // Status endpoint
        .route(
            "/api/status",
            get(handlers::status),
        )
        .with_state(app_state)
}

/// Create a router for testing, backed by a scripted driver and an
/// in-memory VCS fake instead of a real git worktree.
#[cfg(test)]
pub fn create_test_router(db: DatabaseConnection) -> Router {
    use crate::integration::driver::test_support::FakeDriver;
    use crate::integration::driver::Driver;
    use crate::integration::vcs::{FakeVcsAdapter, VcsAdapter};
    use crate::workflow::model::{ExecutionPlan, ReviewResult};

    let broadcast = Arc::new(BroadcastState::new());
    let events = Arc::new(crate::events::bus::EventBus::new(None));
    let driver = Arc::new(FakeDriver {
        plan: ExecutionPlan {
            summary: "test plan".to_string(),
            batches: Vec::new(),
            rationale: None,
            total_estimated_minutes: 0,
            tdd_approach: false,
        },
        review: ReviewResult {
            approved: true,
            feedback: String::new(),
            requested_changes: Vec::new(),
        },
    }) as Arc<dyn Driver>;
    let vcs_factory: crate::services::VcsFactory =
        Arc::new(|head: &str| Arc::new(FakeVcsAdapter::new(head.to_string())) as Arc<dyn VcsAdapter>);
    let orchestrator = OrchestratorService::new(db.clone(), events, driver, vcs_factory, Vec::new(), 10);
    create_router(db, broadcast, orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        let router = create_test_router(db);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        let router = create_test_router(db);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/tasks")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
