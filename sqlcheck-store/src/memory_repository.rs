//! In-memory `Repository` for tests and `--no-database` local dev, mirroring
//! `MemoryStore`'s `RwLock<Inner>` shape.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use sqlcheck_types::error::{CoreError, CoreResult};
use sqlcheck_types::ids::{now, JobId, TaskId};
use sqlcheck_types::model::{Job, JobStatus, Page, Pagination, Task, TaskCounts, TaskStatus};

use crate::repository::{JobFilter, JobStatistics, Repository};
use crate::transitions::{is_valid_job_transition, is_valid_task_transition};

struct Inner {
    jobs: HashMap<JobId, Job>,
    tasks: HashMap<TaskId, Task>,
    /// Preserves insertion order so listings sorted by `created_at desc`
    /// are stable even when two records share a timestamp.
    job_order: Vec<JobId>,
    task_order: Vec<TaskId>,
}

pub struct MemoryRepository {
    inner: RwLock<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                jobs: HashMap::new(),
                tasks: HashMap::new(),
                job_order: Vec::new(),
                task_order: Vec::new(),
            }),
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn paginate<T: Clone>(items: Vec<T>, pagination: Pagination) -> Page<T> {
    let total = items.len() as u64;
    let start = pagination.offset() as usize;
    let page_items = items.into_iter().skip(start).take(pagination.size as usize).collect();
    Page::new(page_items, total, pagination)
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_job(&self, job: Job) -> CoreResult<JobId> {
        let mut inner = self.inner.write().await;
        let id = job.job_id.clone();
        inner.job_order.push(id.clone());
        inner.jobs.insert(id.clone(), job);
        Ok(id)
    }

    async fn get_job(&self, job_id: &JobId) -> CoreResult<Option<Job>> {
        Ok(self.inner.read().await.jobs.get(job_id).cloned())
    }

    async fn set_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error_message: Option<String>,
    ) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::NotFound(format!("job {job_id} not found")))?;
        if !is_valid_job_transition(job.status, status) {
            return Err(CoreError::InvalidTransition(format!(
                "job {job_id}: {:?} -> {:?}",
                job.status, status
            )));
        }
        if job.status == status && error_message.is_none() {
            // No-op re-assertion: don't churn updated_at (§8 round-trip law).
            return Ok(());
        }
        job.status = status;
        if error_message.is_some() {
            job.error_message = error_message;
        }
        job.updated_at = now();
        Ok(())
    }

    async fn list_jobs(&self, pagination: Pagination, filter: JobFilter) -> CoreResult<Page<Job>> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner
            .job_order
            .iter()
            .rev()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|job| filter.status.map(|s| s == job.status).unwrap_or(true))
            .filter(|job| {
                filter
                    .submission_type
                    .map(|t| t == job.submission_type)
                    .unwrap_or(true)
            })
            .filter(|job| filter.created_after.map(|t| job.created_at >= t).unwrap_or(true))
            .filter(|job| filter.created_before.map(|t| job.created_at <= t).unwrap_or(true))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(jobs, pagination))
    }

    async fn job_task_counts(&self, job_id: &JobId) -> CoreResult<TaskCounts> {
        let inner = self.inner.read().await;
        let mut counts = TaskCounts::default();
        for task in inner.tasks.values().filter(|t| &t.job_id == job_id) {
            counts.total += 1;
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Success => counts.success += 1,
                TaskStatus::Failure => counts.failure += 1,
            }
        }
        Ok(counts)
    }

    async fn job_statistics(&self, filter: JobFilter) -> CoreResult<JobStatistics> {
        let inner = self.inner.read().await;
        let jobs: Vec<&Job> = inner
            .jobs
            .values()
            .filter(|job| filter.status.map(|s| s == job.status).unwrap_or(true))
            .filter(|job| {
                filter
                    .submission_type
                    .map(|t| t == job.submission_type)
                    .unwrap_or(true)
            })
            .filter(|job| filter.created_after.map(|t| job.created_at >= t).unwrap_or(true))
            .filter(|job| filter.created_before.map(|t| job.created_at <= t).unwrap_or(true))
            .collect();

        let mut stats = JobStatistics {
            total_jobs: jobs.len() as u64,
            ..Default::default()
        };
        let mut completed_durations = Vec::new();
        for job in &jobs {
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
        let mut inner = self.inner.write().await;
        let id = task.task_id.clone();
        inner.task_order.push(id.clone());
        inner.tasks.insert(id.clone(), task);
        Ok(id)
    }

    async fn create_tasks_batch(&self, tasks: Vec<Task>) -> CoreResult<Vec<TaskId>> {
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            ids.push(self.create_task(task).await?);
        }
        Ok(ids)
    }

    async fn get_task(&self, task_id: &TaskId) -> CoreResult<Option<Task>> {
        Ok(self.inner.read().await.tasks.get(task_id).cloned())
    }

    async fn set_task_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        result_file_path: Option<String>,
        error_message: Option<String>,
    ) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id} not found")))?;
        if !is_valid_task_transition(task.status, status) {
            return Err(CoreError::InvalidTransition(format!(
                "task {task_id}: {:?} -> {:?}",
                task.status, status
            )));
        }
        if task.status == status {
            // No-op re-assertion of a terminal status, e.g. a duplicate
            // `SqlCheckCompleted` delivery for an already-SUCCESS task.
            return Ok(());
        }
        task.status = status;
        task.result_file_path = result_file_path;
        task.error_message = error_message;
        task.updated_at = now();
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
        let inner = self.inner.read().await;
        let mut tasks: Vec<Task> = inner
            .task_order
            .iter()
            .rev()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|t| job_id.as_ref().map(|j| &t.job_id == j).unwrap_or(true))
            .filter(|t| status.map(|s| s == t.status).unwrap_or(true))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(tasks, pagination))
    }

    async fn pending_tasks(&self, limit: u32) -> CoreResult<Vec<Task>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlcheck_types::model::SubmissionType;

    fn sample_job() -> Job {
        let now = now();
        Job {
            job_id: JobId::new(),
            submission_type: SubmissionType::SingleFile,
            source_path: "jobs/x/sources/single_sql_x.sql".into(),
            dialect: "ansi".into(),
            status: JobStatus::Accepted,
            user_id: "u1".into(),
            product_name: "p1".into(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = MemoryRepository::new();
        let job = sample_job();
        let id = job.job_id.clone();
        repo.create_job(job).await.unwrap();
        let fetched = repo.get_job(&id).await.unwrap().unwrap();
        assert_eq!(fetched.job_id, id);
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let repo = MemoryRepository::new();
        let job = sample_job();
        let id = job.job_id.clone();
        repo.create_job(job).await.unwrap();
        let err = repo
            .set_job_status(&id, JobStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn repeated_status_update_is_a_no_op() {
        let repo = MemoryRepository::new();
        let job = sample_job();
        let id = job.job_id.clone();
        repo.create_job(job).await.unwrap();
        repo.set_job_status(&id, JobStatus::Processing, None).await.unwrap();
        let before = repo.get_job(&id).await.unwrap().unwrap().updated_at;
        repo.set_job_status(&id, JobStatus::Processing, None).await.unwrap();
        let after = repo.get_job(&id).await.unwrap().unwrap().updated_at;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn task_counts_reflect_current_statuses() {
        let repo = MemoryRepository::new();
        let job = sample_job();
        let job_id = job.job_id.clone();
        repo.create_job(job).await.unwrap();

        let mut task = Task {
            task_id: TaskId::new(),
            job_id: job_id.clone(),
            status: TaskStatus::Pending,
            source_file_path: "jobs/x/a.sql".into(),
            result_file_path: None,
            error_message: None,
            created_at: now(),
            updated_at: now(),
        };
        let task_id = task.task_id.clone();
        repo.create_task(task.clone()).await.unwrap();
        repo.set_task_status(&task_id, TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        repo.set_task_status(&task_id, TaskStatus::Success, Some("r.json".into()), None)
            .await
            .unwrap();

        let counts = repo.job_task_counts(&job_id).await.unwrap();
        assert_eq!(counts.total, 1);
        assert_eq!(counts.success, 1);

        task.status = TaskStatus::Success;
        let stored = repo.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(stored.status, task.status);
    }
}
