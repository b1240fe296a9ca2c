//! Postgres-backed `Repository` (§4.3), gated behind the `postgres`
//! feature. Queries are runtime-checked (`sqlx::query`, not `query!`)
//! because the schema lives in `migrations/` rather than being known to the
//! compiler at build time, matching `PostgresProcessStore`'s approach.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use sqlcheck_types::error::{CoreError, CoreResult};
use sqlcheck_types::ids::{JobId, TaskId};
use sqlcheck_types::model::{Job, JobStatus, Page, Pagination, SubmissionType, Task, TaskCounts, TaskStatus};

use crate::repository::{JobFilter, JobStatistics, Repository};
use crate::transitions::{is_valid_job_transition, is_valid_task_transition};

pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> CoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CoreError::Repository(format!("migration failed: {e}")))
    }
}

fn job_status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Accepted => "ACCEPTED",
        JobStatus::Processing => "PROCESSING",
        JobStatus::Completed => "COMPLETED",
        JobStatus::PartiallyCompleted => "PARTIALLY_COMPLETED",
        JobStatus::Failed => "FAILED",
    }
}

fn parse_job_status(s: &str) -> CoreResult<JobStatus> {
    match s {
        "ACCEPTED" => Ok(JobStatus::Accepted),
        "PROCESSING" => Ok(JobStatus::Processing),
        "COMPLETED" => Ok(JobStatus::Completed),
        "PARTIALLY_COMPLETED" => Ok(JobStatus::PartiallyCompleted),
        "FAILED" => Ok(JobStatus::Failed),
        other => Err(CoreError::Repository(format!("unknown job status {other}"))),
    }
}

fn task_status_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "PENDING",
        TaskStatus::InProgress => "IN_PROGRESS",
        TaskStatus::Success => "SUCCESS",
        TaskStatus::Failure => "FAILURE",
    }
}

fn parse_task_status(s: &str) -> CoreResult<TaskStatus> {
    match s {
        "PENDING" => Ok(TaskStatus::Pending),
        "IN_PROGRESS" => Ok(TaskStatus::InProgress),
        "SUCCESS" => Ok(TaskStatus::Success),
        "FAILURE" => Ok(TaskStatus::Failure),
        other => Err(CoreError::Repository(format!("unknown task status {other}"))),
    }
}

fn submission_type_str(s: SubmissionType) -> &'static str {
    match s {
        SubmissionType::SingleFile => "SINGLE_FILE",
        SubmissionType::Archive => "ARCHIVE",
    }
}

fn parse_submission_type(s: &str) -> CoreResult<SubmissionType> {
    match s {
        "SINGLE_FILE" => Ok(SubmissionType::SingleFile),
        "ARCHIVE" => Ok(SubmissionType::Archive),
        other => Err(CoreError::Repository(format!("unknown submission type {other}"))),
    }
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> CoreResult<Job> {
    Ok(Job {
        job_id: JobId::parse(row.try_get::<String, _>("job_id").map_err(pg_err)?.as_str())
            .map_err(|e| CoreError::Repository(e.to_string()))?,
        submission_type: parse_submission_type(&row.try_get::<String, _>("submission_type").map_err(pg_err)?)?,
        source_path: row.try_get("source_path").map_err(pg_err)?,
        dialect: row.try_get("dialect").map_err(pg_err)?,
        status: parse_job_status(&row.try_get::<String, _>("status").map_err(pg_err)?)?,
        user_id: row.try_get("user_id").map_err(pg_err)?,
        product_name: row.try_get("product_name").map_err(pg_err)?,
        error_message: row.try_get("error_message").map_err(pg_err)?,
        created_at: row.try_get("created_at").map_err(pg_err)?,
        updated_at: row.try_get("updated_at").map_err(pg_err)?,
    })
}

fn row_to_task(row: &sqlx::postgres::PgRow) -> CoreResult<Task> {
    Ok(Task {
        task_id: TaskId::parse(row.try_get::<String, _>("task_id").map_err(pg_err)?.as_str())
            .map_err(|e| CoreError::Repository(e.to_string()))?,
        job_id: JobId::parse(row.try_get::<String, _>("job_id").map_err(pg_err)?.as_str())
            .map_err(|e| CoreError::Repository(e.to_string()))?,
        status: parse_task_status(&row.try_get::<String, _>("status").map_err(pg_err)?)?,
        source_file_path: row.try_get("source_file_path").map_err(pg_err)?,
        result_file_path: row.try_get("result_file_path").map_err(pg_err)?,
        error_message: row.try_get("error_message").map_err(pg_err)?,
        created_at: row.try_get("created_at").map_err(pg_err)?,
        updated_at: row.try_get("updated_at").map_err(pg_err)?,
    })
}

fn pg_err(e: sqlx::Error) -> CoreError {
    CoreError::Repository(e.to_string())
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_job(&self, job: Job) -> CoreResult<JobId> {
        sqlx::query(
            "INSERT INTO jobs (job_id, submission_type, source_path, dialect, status, user_id, product_name, error_message, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(job.job_id.as_str())
        .bind(submission_type_str(job.submission_type))
        .bind(&job.source_path)
        .bind(&job.dialect)
        .bind(job_status_str(job.status))
        .bind(&job.user_id)
        .bind(&job.product_name)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(job.job_id)
    }

    async fn get_job(&self, job_id: &JobId) -> CoreResult<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE job_id = $1")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(pg_err)?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn set_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error_message: Option<String>,
    ) -> CoreResult<()> {
        let current = self
            .get_job(job_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("job {job_id} not found")))?;
        if !is_valid_job_transition(current.status, status) {
            return Err(CoreError::InvalidTransition(format!(
                "job {job_id}: {:?} -> {:?}",
                current.status, status
            )));
        }
        if current.status == status && error_message.is_none() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE jobs SET status = $1, error_message = COALESCE($2, error_message), updated_at = now()
             WHERE job_id = $3",
        )
        .bind(job_status_str(status))
        .bind(&error_message)
        .bind(job_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(())
    }

    async fn list_jobs(&self, pagination: Pagination, filter: JobFilter) -> CoreResult<Page<Job>> {
        // Runtime-checked dynamic filtering mirrors `ProcessStore`'s
        // query-builder style for optional predicates; the
        // bind count must track the placeholder actually present in the
        // query text, so the `$1` only appears when a status filter does.
        let rows = if let Some(status) = filter.status {
            sqlx::query("SELECT * FROM jobs WHERE status = $1")
                .bind(job_status_str(status))
                .fetch_all(&self.pool)
                .await
                .map_err(pg_err)?
        } else {
            sqlx::query("SELECT * FROM jobs").fetch_all(&self.pool).await.map_err(pg_err)?
        };
        let mut jobs: Vec<Job> = rows.iter().map(row_to_job).collect::<CoreResult<_>>()?;
        jobs.retain(|job| {
            filter.submission_type.map(|t| t == job.submission_type).unwrap_or(true)
                && filter.created_after.map(|t| job.created_at >= t).unwrap_or(true)
                && filter.created_before.map(|t| job.created_at <= t).unwrap_or(true)
        });
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = jobs.len() as u64;
        let start = pagination.offset() as usize;
        let page_items = jobs.into_iter().skip(start).take(pagination.size as usize).collect();
        Ok(Page::new(page_items, total, pagination))
    }

    async fn job_task_counts(&self, job_id: &JobId) -> CoreResult<TaskCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) as c FROM tasks WHERE job_id = $1 GROUP BY status")
            .bind(job_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(pg_err)?;
        let mut counts = TaskCounts::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(pg_err)?;
            let c: i64 = row.try_get("c").map_err(pg_err)?;
            let c = c as u64;
            counts.total += c;
            match parse_task_status(&status)? {
                TaskStatus::Pending => counts.pending = c,
                TaskStatus::InProgress => counts.in_progress = c,
                TaskStatus::Success => counts.success = c,
                TaskStatus::Failure => counts.failure = c,
            }
        }
        Ok(counts)
    }

    async fn job_statistics(&self, filter: JobFilter) -> CoreResult<JobStatistics> {
        // Unlike `list_jobs`, this scans every matching row rather than a
        // `Pagination`-bounded page, so `Pagination::MAX_SIZE` can't
        // truncate the aggregate.
        let rows = sqlx::query("SELECT * FROM jobs")
            .fetch_all(&self.pool)
            .await
            .map_err(pg_err)?;
        let mut all: Vec<Job> = rows.iter().map(row_to_job).collect::<CoreResult<_>>()?;
        all.retain(|job| {
            filter.status.map(|s| s == job.status).unwrap_or(true)
                && filter.submission_type.map(|t| t == job.submission_type).unwrap_or(true)
                && filter.created_after.map(|t| job.created_at >= t).unwrap_or(true)
                && filter.created_before.map(|t| job.created_at <= t).unwrap_or(true)
        });
        let mut stats = JobStatistics {
            total_jobs: all.len() as u64,
            ..Default::default()
        };
        let mut completed_durations = Vec::new();
        for job in &all {
            match job.status {
                JobStatus::Accepted => stats.accepted_jobs += 1,
                JobStatus::Processing => stats.processing_jobs += 1,
                JobStatus::Completed => {
                    stats.completed_jobs += 1;
                    completed_durations
                        .push((job.updated_at - job.created_at).num_milliseconds().max(0) as f64);
                }
                JobStatus::PartiallyCompleted => stats.partially_completed_jobs += 1,
                JobStatus::Failed => stats.failed_jobs += 1,
            }
        }
        if !completed_durations.is_empty() {
            let avg_ms = completed_durations.iter().sum::<f64>() / completed_durations.len() as f64;
            stats.avg_processing_time_minutes = Some(avg_ms / 60_000.0);
        }
        Ok(stats)
    }

    async fn create_task(&self, task: Task) -> CoreResult<TaskId> {
        sqlx::query(
            "INSERT INTO tasks (task_id, job_id, status, source_file_path, result_file_path, error_message, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(task.task_id.as_str())
        .bind(task.job_id.as_str())
        .bind(task_status_str(task.status))
        .bind(&task.source_file_path)
        .bind(&task.result_file_path)
        .bind(&task.error_message)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(task.task_id)
    }

    async fn create_tasks_batch(&self, tasks: Vec<Task>) -> CoreResult<Vec<TaskId>> {
        let mut tx = self.pool.begin().await.map_err(pg_err)?;
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            sqlx::query(
                "INSERT INTO tasks (task_id, job_id, status, source_file_path, result_file_path, error_message, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(task.task_id.as_str())
            .bind(task.job_id.as_str())
            .bind(task_status_str(task.status))
            .bind(&task.source_file_path)
            .bind(&task.result_file_path)
            .bind(&task.error_message)
            .bind(task.created_at)
            .bind(task.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(pg_err)?;
            ids.push(task.task_id);
        }
        tx.commit().await.map_err(pg_err)?;
        Ok(ids)
    }

    async fn get_task(&self, task_id: &TaskId) -> CoreResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE task_id = $1")
            .bind(task_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(pg_err)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn set_task_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        result_file_path: Option<String>,
        error_message: Option<String>,
    ) -> CoreResult<()> {
        let current = self
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id} not found")))?;
        if !is_valid_task_transition(current.status, status) {
            return Err(CoreError::InvalidTransition(format!(
                "task {task_id}: {:?} -> {:?}",
                current.status, status
            )));
        }
        if current.status == status {
            return Ok(());
        }
        sqlx::query(
            "UPDATE tasks SET status = $1, result_file_path = $2, error_message = $3, updated_at = now()
             WHERE task_id = $4",
        )
        .bind(task_status_str(status))
        .bind(&result_file_path)
        .bind(&error_message)
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(())
    }

    async fn list_tasks_by_job(
        &self,
        job_id: &JobId,
        pagination: Pagination,
        status: Option<TaskStatus>,
    ) -> CoreResult<Page<Task>> {
        self.list_tasks(pagination, Some(job_id.clone()), status).await
    }

    async fn list_tasks(
        &self,
        pagination: Pagination,
        job_id: Option<JobId>,
        status: Option<TaskStatus>,
    ) -> CoreResult<Page<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks")
            .fetch_all(&self.pool)
            .await
            .map_err(pg_err)?;
        let mut tasks: Vec<Task> = rows.iter().map(row_to_task).collect::<CoreResult<_>>()?;
        tasks.retain(|t| {
            job_id.as_ref().map(|j| &t.job_id == j).unwrap_or(true)
                && status.map(|s| s == t.status).unwrap_or(true)
        });
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = tasks.len() as u64;
        let start = pagination.offset() as usize;
        let page_items = tasks.into_iter().skip(start).take(pagination.size as usize).collect();
        Ok(Page::new(page_items, total, pagination))
    }

    async fn pending_tasks(&self, limit: u32) -> CoreResult<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE status = 'PENDING' ORDER BY created_at LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(pg_err)?;
        rows.iter().map(row_to_task).collect()
    }
}
