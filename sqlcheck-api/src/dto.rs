//! Request/response bodies for the Control API (§6.1), generalizing the
//! teacher's request/response struct convention in `agent_routes.rs`.

use serde::{Deserialize, Serialize};

use sqlcheck_store::JobStatistics;
use sqlcheck_types::ids::{JobId, TaskId};
use sqlcheck_types::model::{Job, JobStatus, Page, SubmissionType, Task, TaskStatus};

#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    pub sql_content: Option<String>,
    pub archive_path: Option<String>,
    pub dialect: Option<String>,
    pub user_id: String,
    pub product_name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: JobId,
}

#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListJobsQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub status: Option<JobStatus>,
    pub submission_type: Option<SubmissionType>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListTasksQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub status: Option<TaskStatus>,
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub submission_type: SubmissionType,
    pub dialect: String,
    pub status: JobStatus,
    pub user_id: String,
    pub product_name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            submission_type: job.submission_type,
            dialect: job.dialect.clone(),
            status: job.status,
            user_id: job.user_id.clone(),
            product_name: job.product_name.clone(),
            created_at: sqlcheck_types::ids::format_timestamp(job.created_at),
            updated_at: sqlcheck_types::ids::format_timestamp(job.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub status: TaskStatus,
    pub source_file_path: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            job_id: task.job_id.clone(),
            status: task.status,
            source_file_path: task.source_file_path.clone(),
            created_at: sqlcheck_types::ids::format_timestamp(task.created_at),
            updated_at: sqlcheck_types::ids::format_timestamp(task.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskDetail {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub status: TaskStatus,
    pub source_file_path: String,
    pub result_file_path: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Task> for TaskDetail {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            job_id: task.job_id.clone(),
            status: task.status,
            source_file_path: task.source_file_path.clone(),
            result_file_path: task.result_file_path.clone(),
            error_message: task.error_message.clone(),
            created_at: sqlcheck_types::ids::format_timestamp(task.created_at),
            updated_at: sqlcheck_types::ids::format_timestamp(task.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub source_path: String,
    pub error_message: Option<String>,
    pub sub_tasks: Page<TaskSummary>,
}

#[derive(Debug, Serialize)]
pub struct JobTasksResponse {
    pub job_id: JobId,
    pub task_ids: Vec<TaskId>,
    pub total_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct RetryTasksBody {
    pub task_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FailedSubmission {
    pub task_id: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RetryTasksResponse {
    pub submitted_tasks: Vec<TaskId>,
    pub failed_submissions: Vec<FailedSubmission>,
}

pub type JobStatisticsResponse = JobStatistics;
