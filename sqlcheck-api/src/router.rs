//! Route table for the Control API (§6.1), in the shape of
//! `create_agentic_router`'s free-function router construction.

use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::middleware::request_id;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/jobs", post(handlers::create_job).get(handlers::list_jobs))
        .route("/api/v1/jobs/statistics", get(handlers::job_statistics))
        .route("/api/v1/jobs/:job_id", get(handlers::get_job))
        .route("/api/v1/jobs/:job_id/tasks", get(handlers::job_tasks))
        .route("/api/v1/tasks", get(handlers::list_tasks))
        .route("/api/v1/tasks/retry", post(handlers::retry_tasks))
        .route("/api/v1/tasks/:task_id", get(handlers::get_task))
        .route("/api/v1/tasks/:task_id/result", get(handlers::get_task_result))
        .route(
            "/api/v1/tasks/:task_id/result/download",
            get(handlers::download_task_result),
        )
        .layer(axum_middleware::from_fn(request_id))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use sqlcheck_bus::InMemoryBus;
    use sqlcheck_core::{JobService, TaskService};
    use sqlcheck_filestore::LocalFileStore;
    use sqlcheck_store::{MemoryLockService, MemoryRepository};

    fn test_state(dir: &std::path::Path) -> AppState {
        let repository: Arc<dyn sqlcheck_store::Repository> = Arc::new(MemoryRepository::new());
        let filestore: Arc<dyn sqlcheck_filestore::FileStore> = Arc::new(LocalFileStore::new(dir, 1024 * 1024));
        let bus: Arc<dyn sqlcheck_bus::Bus> = Arc::new(InMemoryBus::new());
        let locks: Arc<dyn sqlcheck_store::LockService> = Arc::new(MemoryLockService::new());

        let jobs = JobService::new(
            repository.clone(),
            filestore.clone(),
            bus,
            locks,
            "ansi",
            Duration::from_secs(300),
        );
        let tasks = TaskService::new(repository, filestore);
        AppState::new(jobs, tasks)
    }

    #[tokio::test]
    async fn create_job_rejects_when_neither_field_is_set() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"user_id": "u", "product_name": "p"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn create_job_accepts_single_file_submission_and_echoes_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/jobs")
                    .header("content-type", "application/json")
                    .header("x-request-id", "req-fixed-marker")
                    .body(Body::from(
                        serde_json::json!({
                            "sql_content": "SELECT 1;",
                            "dialect": "mysql",
                            "user_id": "u",
                            "product_name": "p"
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            response.headers().get("x-request-id").unwrap(),
            "req-fixed-marker"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["job_id"].as_str().unwrap().starts_with("job-"));
    }

    #[tokio::test]
    async fn get_job_404s_for_an_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let unknown = sqlcheck_types::ids::JobId::new();
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/api/v1/jobs/{unknown}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn retry_tasks_rejects_more_than_a_hundred_ids() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let ids: Vec<String> = (0..101).map(|_| sqlcheck_types::ids::TaskId::new().to_string()).collect();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/tasks/retry")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::json!({ "task_ids": ids }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn retry_tasks_reports_unknown_ids_as_failed_submissions() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let unknown = sqlcheck_types::ids::TaskId::new();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/tasks/retry")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({ "task_ids": [unknown.to_string()] }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["submitted_tasks"].as_array().unwrap().is_empty());
        assert_eq!(json["failed_submissions"].as_array().unwrap().len(), 1);
    }
}
