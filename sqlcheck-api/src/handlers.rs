//! Route handlers for the Control API (§6.1), one function per table row,
//! following `agent_routes.rs`'s `State(state)` + typed `Json`/`Path`/`Query`
//! extractor convention.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use sqlcheck_core::CreateJobRequest;
use sqlcheck_store::JobFilter;
use sqlcheck_types::ids::{JobId, TaskId};
use sqlcheck_types::model::Pagination;

use crate::dto::*;
use crate::error::{bad_request, ApiError};
use crate::state::AppState;

fn pagination_of(page: Option<u32>, size: Option<u32>) -> Pagination {
    Pagination::new(page.unwrap_or(1), size.unwrap_or(10))
}

/// POST /api/v1/jobs
pub async fn create_job(
    State(state): State<AppState>,
    Json(body): Json<CreateJobBody>,
) -> Result<Response, Response> {
    if body.sql_content.is_none() && body.archive_path.is_none() {
        return Err(bad_request("exactly one of sql_content or archive_path must be set"));
    }
    if body.sql_content.is_some() && body.archive_path.is_some() {
        return Err(bad_request("exactly one of sql_content or archive_path must be set, not both"));
    }

    let job_id = state
        .jobs
        .create_job(CreateJobRequest {
            sql_content: body.sql_content,
            archive_path: body.archive_path,
            dialect: body.dialect,
            user_id: body.user_id,
            product_name: body.product_name,
        })
        .await
        .map_err(|e| ApiError(e).into_response())?;

    Ok((StatusCode::ACCEPTED, Json(CreateJobResponse { job_id })).into_response())
}

/// GET /api/v1/jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<JobDetail>, ApiError> {
    let job_id = JobId::parse(job_id).map_err(|e| ApiError(sqlcheck_types::error::CoreError::Validation(e.to_string())))?;
    let job = state
        .jobs
        .get_job(&job_id)
        .await?
        .ok_or_else(|| ApiError(sqlcheck_types::error::CoreError::NotFound(format!("job {job_id} not found"))))?;

    let pagination = pagination_of(query.page, query.size);
    let sub_tasks = state.tasks.list_tasks_by_job(&job_id, pagination, None).await?;
    let sub_tasks = Page {
        items: sub_tasks.items.iter().map(TaskSummary::from).collect(),
        total: sub_tasks.total,
        page: sub_tasks.page,
        size: sub_tasks.size,
        pages: sub_tasks.pages,
        has_next: sub_tasks.has_next,
        has_prev: sub_tasks.has_prev,
    };

    Ok(Json(JobDetail {
        summary: JobSummary::from(&job),
        source_path: job.source_path.clone(),
        error_message: job.error_message.clone(),
        sub_tasks,
    }))
}

/// GET /api/v1/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<sqlcheck_types::model::Page<JobSummary>>, ApiError> {
    let pagination = pagination_of(query.page, query.size);
    let filter = JobFilter {
        status: query.status,
        submission_type: query.submission_type,
        created_after: None,
        created_before: None,
    };
    let page = state.jobs.list_jobs(pagination, filter).await?;
    Ok(Json(sqlcheck_types::model::Page {
        items: page.items.iter().map(JobSummary::from).collect(),
        total: page.total,
        page: page.page,
        size: page.size,
        pages: page.pages,
        has_next: page.has_next,
        has_prev: page.has_prev,
    }))
}

/// GET /api/v1/jobs/statistics
pub async fn job_statistics(State(state): State<AppState>) -> Result<Json<JobStatisticsResponse>, ApiError> {
    let stats = state.jobs.job_statistics(JobFilter::default()).await?;
    Ok(Json(stats))
}

/// GET /api/v1/jobs/{job_id}/tasks
pub async fn job_tasks(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobTasksResponse>, ApiError> {
    let job_id = JobId::parse(job_id).map_err(|e| ApiError(sqlcheck_types::error::CoreError::Validation(e.to_string())))?;
    state
        .jobs
        .get_job(&job_id)
        .await?
        .ok_or_else(|| ApiError(sqlcheck_types::error::CoreError::NotFound(format!("job {job_id} not found"))))?;

    let mut task_ids = Vec::new();
    let mut page = 1;
    loop {
        let batch = state
            .tasks
            .list_tasks_by_job(&job_id, Pagination::new(page, Pagination::MAX_SIZE), None)
            .await?;
        let got = batch.items.len();
        task_ids.extend(batch.items.into_iter().map(|t| t.task_id));
        if !batch.has_next || got == 0 {
            break;
        }
        page += 1;
    }
    let total_count = task_ids.len() as u64;

    Ok(Json(JobTasksResponse { job_id, task_ids, total_count }))
}

/// GET /api/v1/tasks/{task_id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskDetail>, ApiError> {
    let task_id = TaskId::parse(task_id).map_err(|e| ApiError(sqlcheck_types::error::CoreError::Validation(e.to_string())))?;
    let task = state
        .tasks
        .get_task(&task_id)
        .await?
        .ok_or_else(|| ApiError(sqlcheck_types::error::CoreError::NotFound(format!("task {task_id} not found"))))?;
    Ok(Json(TaskDetail::from(&task)))
}

/// GET /api/v1/tasks/{task_id}/result
pub async fn get_task_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task_id = TaskId::parse(task_id).map_err(|e| ApiError(sqlcheck_types::error::CoreError::Validation(e.to_string())))?;
    let result = state.tasks.get_task_result(&task_id).await?;
    Ok(Json(result))
}

/// GET /api/v1/tasks/{task_id}/result/download
pub async fn download_task_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let task_id = TaskId::parse(task_id).map_err(|e| ApiError(sqlcheck_types::error::CoreError::Validation(e.to_string())))?;
    let raw = state.tasks.get_task_result_raw(&task_id).await?;

    Ok((
        StatusCode::OK,
        [
            ("content-type".to_string(), "application/json".to_string()),
            (
                "content-disposition".to_string(),
                format!("attachment; filename=\"{task_id}_result.json\""),
            ),
        ],
        raw,
    )
        .into_response())
}

/// GET /api/v1/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<sqlcheck_types::model::Page<TaskSummary>>, ApiError> {
    let pagination = pagination_of(query.page, query.size);
    let job_id = query
        .job_id
        .map(JobId::parse)
        .transpose()
        .map_err(|e| ApiError(sqlcheck_types::error::CoreError::Validation(e.to_string())))?;
    let page = state.tasks.list_tasks(pagination, job_id, query.status).await?;
    Ok(Json(sqlcheck_types::model::Page {
        items: page.items.iter().map(TaskSummary::from).collect(),
        total: page.total,
        page: page.page,
        size: page.size,
        pages: page.pages,
        has_next: page.has_next,
        has_prev: page.has_prev,
    }))
}

/// POST /api/v1/tasks/retry
pub async fn retry_tasks(
    State(state): State<AppState>,
    Json(body): Json<RetryTasksBody>,
) -> Result<Json<RetryTasksResponse>, Response> {
    if body.task_ids.is_empty() {
        return Err(bad_request("task_ids must not be empty"));
    }
    if body.task_ids.len() > 100 {
        return Err(bad_request("task_ids must not exceed 100 entries"));
    }

    let mut parsed = Vec::with_capacity(body.task_ids.len());
    let mut malformed = Vec::new();
    for raw in body.task_ids {
        match TaskId::parse(&raw) {
            Ok(id) => parsed.push(id),
            Err(_) => malformed.push(FailedSubmission {
                task_id: raw,
                reason: "malformed task id".to_string(),
            }),
        }
    }

    let (accepted, rejected) = state
        .jobs
        .retry_failed_tasks(parsed)
        .await
        .map_err(|e| ApiError(e).into_response())?;

    let mut failed_submissions: Vec<FailedSubmission> = rejected
        .into_iter()
        .map(|task_id| FailedSubmission {
            task_id: task_id.to_string(),
            reason: "task not found or not in FAILURE status".to_string(),
        })
        .collect();
    failed_submissions.extend(malformed);

    Ok(Json(RetryTasksResponse {
        submitted_tasks: accepted,
        failed_submissions,
    }))
}
