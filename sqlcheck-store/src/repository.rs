//! The Repository trait (§4.3): the only owner of Job/Task records. Plain
//! records plus explicit queries — no ORM-owned lazy relationships (§9
//! redesign note); `list_tasks_by_job` is always an explicit call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlcheck_types::error::CoreResult;
use sqlcheck_types::ids::{JobId, TaskId};
use sqlcheck_types::model::{Job, JobStatus, Page, Pagination, SubmissionType, Task, TaskCounts, TaskStatus};

#[derive(Debug, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub submission_type: Option<SubmissionType>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            submission_type: None,
            created_after: None,
            created_before: None,
        }
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_job(&self, job: Job) -> CoreResult<JobId>;
    async fn get_job(&self, job_id: &JobId) -> CoreResult<Option<Job>>;
    async fn set_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error_message: Option<String>,
    ) -> CoreResult<()>;
    async fn list_jobs(&self, pagination: Pagination, filter: JobFilter) -> CoreResult<Page<Job>>;
    async fn job_task_counts(&self, job_id: &JobId) -> CoreResult<TaskCounts>;
    async fn job_statistics(&self, filter: JobFilter) -> CoreResult<JobStatistics>;

    async fn create_task(&self, task: Task) -> CoreResult<TaskId>;
    async fn create_tasks_batch(&self, tasks: Vec<Task>) -> CoreResult<Vec<TaskId>>;
    async fn get_task(&self, task_id: &TaskId) -> CoreResult<Option<Task>>;
    async fn set_task_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        result_file_path: Option<String>,
        error_message: Option<String>,
    ) -> CoreResult<()>;
    async fn list_tasks_by_job(
        &self,
        job_id: &JobId,
        pagination: Pagination,
        status: Option<TaskStatus>,
    ) -> CoreResult<Page<Task>>;
    async fn list_tasks(
        &self,
        pagination: Pagination,
        job_id: Option<JobId>,
        status: Option<TaskStatus>,
    ) -> CoreResult<Page<Task>>;
    /// Diagnostic-only: never mounted on the public router (see DESIGN.md's
    /// Open Question decisions), but the repository still exposes it for
    /// the worker's own internal bookkeeping and for tests.
    async fn pending_tasks(&self, limit: u32) -> CoreResult<Vec<Task>>;
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct JobStatistics {
    pub total_jobs: u64,
    pub accepted_jobs: u64,
    pub processing_jobs: u64,
    pub completed_jobs: u64,
    pub partially_completed_jobs: u64,
    pub failed_jobs: u64,
    pub avg_processing_time_minutes: Option<f64>,
}
