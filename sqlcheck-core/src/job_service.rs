//! Job Service (C8), the control-plane facade in the shape of
//! `BpmnLiteEngine`: a thin, cloneable wrapper around `Arc<dyn Repository>`
//! / `Arc<dyn FileStore>` / `Arc<dyn Bus>` / `Arc<dyn LockService>` that
//! owns job creation, decomposition, and status derivation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use sqlcheck_bus::Bus;
use sqlcheck_filestore::paths::{archive_extract_dir, job_dir};
use sqlcheck_filestore::FileStore;
use sqlcheck_store::{JobFilter, JobStatistics, LockService, Repository};
use sqlcheck_types::error::{CoreError, CoreResult};
use sqlcheck_types::event::{BatchTriplet, Envelope, EventPayload, SqlCheckRequested};
use sqlcheck_types::ids::{now, BatchId, JobId, RequestId, TaskId};
use sqlcheck_types::model::{Job, JobStatus, Page, Pagination, SubmissionType, Task, TaskCounts, TaskStatus};

use crate::derive::derive_job_status;

const DECOMPOSITION_LOCK_HOLDER: &str = "job-service";

#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub sql_content: Option<String>,
    pub archive_path: Option<String>,
    pub dialect: Option<String>,
    pub user_id: String,
    pub product_name: String,
}

/// The seam `TaskService` calls into after a task mutation, so it doesn't
/// need to depend on the whole `JobService` (only on re-derivation).
#[async_trait]
pub trait JobRederiver: Send + Sync {
    async fn rederive(&self, job_id: &JobId) -> CoreResult<()>;
}

#[derive(Clone)]
pub struct JobService {
    repository: Arc<dyn Repository>,
    filestore: Arc<dyn FileStore>,
    bus: Arc<dyn Bus>,
    locks: Arc<dyn LockService>,
    default_dialect: String,
    decomposition_lock_ttl: Duration,
}

impl JobService {
    pub fn new(
        repository: Arc<dyn Repository>,
        filestore: Arc<dyn FileStore>,
        bus: Arc<dyn Bus>,
        locks: Arc<dyn LockService>,
        default_dialect: impl Into<String>,
        decomposition_lock_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            filestore,
            bus,
            locks,
            default_dialect: default_dialect.into(),
            decomposition_lock_ttl,
        }
    }

    /// Step 1-5 of §4.8: validates the request, writes or verifies the
    /// source, persists the Job as ACCEPTED, and spawns decomposition as a
    /// background step so the caller gets `job_id` back immediately.
    pub async fn create_job(&self, request: CreateJobRequest) -> CoreResult<JobId> {
        match (&request.sql_content, &request.archive_path) {
            (Some(_), Some(_)) => {
                return Err(CoreError::Validation(
                    "exactly one of sql_content or archive_path must be set, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(CoreError::Validation(
                    "exactly one of sql_content or archive_path must be set".to_string(),
                ))
            }
            _ => {}
        }

        let job_id = JobId::new();
        let dialect = request.dialect.clone().unwrap_or_else(|| self.default_dialect.clone());

        let (submission_type, source_path) = if let Some(content) = &request.sql_content {
            let relpath = format!("{}/sources/single_sql_{job_id}.sql", job_dir(&job_id));
            self.filestore.write_text(&relpath, content).await?;
            (SubmissionType::SingleFile, relpath)
        } else {
            let archive_path = request.archive_path.clone().unwrap();
            if !self.filestore.exists(&archive_path).await {
                return Err(CoreError::FileNotFound(archive_path));
            }
            (SubmissionType::Archive, archive_path)
        };

        let now_ts = now();
        let job = Job {
            job_id: job_id.clone(),
            submission_type,
            source_path,
            dialect,
            status: JobStatus::Accepted,
            user_id: request.user_id,
            product_name: request.product_name,
            error_message: None,
            created_at: now_ts,
            updated_at: now_ts,
        };
        self.repository.create_job(job).await?;

        let service = self.clone();
        let spawned_job_id = job_id.clone();
        tokio::spawn(async move {
            if let Err(e) = service.decompose(&spawned_job_id).await {
                error!(job_id = %spawned_job_id, error = %e, "job decomposition failed");
            }
        });

        Ok(job_id)
    }

    /// §4.8 "Decomposition", run under `expand_zip_<job_id>`.
    async fn decompose(&self, job_id: &JobId) -> CoreResult<()> {
        let lock_key = format!("expand_zip_{job_id}");
        let lease = self
            .locks
            .acquire(&lock_key, DECOMPOSITION_LOCK_HOLDER, self.decomposition_lock_ttl)
            .await?;

        let result = self.decompose_locked(job_id).await;

        if let Err(e) = self.locks.release(&lease).await {
            warn!(job_id = %job_id, error = %e, "failed releasing decomposition lock");
        }
        result
    }

    async fn decompose_locked(&self, job_id: &JobId) -> CoreResult<()> {
        self.repository.set_job_status(job_id, JobStatus::Processing, None).await?;

        let job = self
            .repository
            .get_job(job_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("job {job_id} not found")))?;

        let task_sources: Vec<String> = match job.submission_type {
            SubmissionType::SingleFile => vec![job.source_path.clone()],
            SubmissionType::Archive => {
                let extract_into = archive_extract_dir(job_id);
                let (_, sql_files) = self.filestore.expand_archive(&job.source_path, &extract_into).await?;
                let mut canonical_paths = Vec::with_capacity(sql_files.len());
                for extracted_relpath in sql_files {
                    let basename = extracted_relpath.rsplit('/').next().unwrap_or(&extracted_relpath);
                    let canonical = format!("{}/{basename}", job_dir(job_id));
                    self.filestore.copy(&extracted_relpath, &canonical).await?;
                    canonical_paths.push(canonical);
                }
                canonical_paths
            }
        };

        if task_sources.is_empty() {
            self.repository
                .set_job_status(job_id, JobStatus::Failed, Some("No SQL files found".to_string()))
                .await?;
            return Ok(());
        }

        let total_files = task_sources.len() as u32;
        let batch_id = if job.submission_type == SubmissionType::Archive {
            Some(BatchId::new())
        } else {
            None
        };

        let mut tasks = Vec::with_capacity(task_sources.len());
        for source_path in &task_sources {
            let task_id = TaskId::new();
            let ts = now();
            tasks.push(Task {
                task_id,
                job_id: job_id.clone(),
                status: TaskStatus::Pending,
                source_file_path: source_path.clone(),
                result_file_path: None,
                error_message: None,
                created_at: ts,
                updated_at: ts,
            });
        }
        self.repository.create_tasks_batch(tasks.clone()).await?;

        for (index, task) in tasks.iter().enumerate() {
            let file_name = task.source_file_path.rsplit('/').next().unwrap_or(&task.source_file_path).to_string();
            let batch = batch_id.as_ref().map(|batch_id| BatchTriplet {
                batch_id: batch_id.clone(),
                file_index: (index + 1) as u32,
                total_files,
            });
            let envelope = Envelope::new(
                RequestId::new(),
                EventPayload::SqlCheckRequested(SqlCheckRequested {
                    job_id: job_id.clone(),
                    task_id: task.task_id.clone(),
                    file_name,
                    sql_file_path: task.source_file_path.clone(),
                    dialect: job.dialect.clone(),
                    rules: None,
                    exclude_rules: None,
                    config_overrides: None,
                    batch,
                    user_id: Some(job.user_id.clone()),
                    product_name: Some(job.product_name.clone()),
                }),
            );
            self.bus.publish_request(envelope).await?;
        }

        Ok(())
    }

    /// §4.8 `retry_failed_tasks`: accepted ids are reset to PENDING and
    /// republished; unknown or non-FAILURE ids are rejected.
    pub async fn retry_failed_tasks(&self, task_ids: Vec<TaskId>) -> CoreResult<(Vec<TaskId>, Vec<TaskId>)> {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for task_id in task_ids {
            let Some(task) = self.repository.get_task(&task_id).await? else {
                rejected.push(task_id);
                continue;
            };
            if task.status != TaskStatus::Failure {
                rejected.push(task_id);
                continue;
            }

            self.repository
                .set_task_status(&task_id, TaskStatus::Pending, None, None)
                .await?;
            // §3 invariant 4's explicit FAILED -> PROCESSING re-drive edge:
            // with a PENDING task present again, `derive_job_status` yields
            // PROCESSING, which is the only legal edge out of FAILED, so the
            // worker's later terminal transition for this task doesn't land
            // on an absorbing stored status.
            self.rederive(&task.job_id).await?;

            let job = self.repository.get_job(&task.job_id).await?.ok_or_else(|| {
                CoreError::NotFound(format!("job {} for retried task {task_id} not found", task.job_id))
            })?;
            let file_name = task.source_file_path.rsplit('/').next().unwrap_or(&task.source_file_path).to_string();
            let envelope = Envelope::new(
                RequestId::new(),
                EventPayload::SqlCheckRequested(SqlCheckRequested {
                    job_id: task.job_id.clone(),
                    task_id: task_id.clone(),
                    file_name,
                    sql_file_path: task.source_file_path.clone(),
                    dialect: job.dialect.clone(),
                    rules: None,
                    exclude_rules: None,
                    config_overrides: None,
                    batch: None,
                    user_id: Some(job.user_id.clone()),
                    product_name: Some(job.product_name.clone()),
                }),
            );
            self.bus.publish_request(envelope).await?;
            accepted.push(task_id);
        }

        Ok((accepted, rejected))
    }

    pub async fn get_job(&self, job_id: &JobId) -> CoreResult<Option<Job>> {
        self.repository.get_job(job_id).await
    }

    pub async fn list_jobs(&self, pagination: Pagination, filter: JobFilter) -> CoreResult<Page<Job>> {
        self.repository.list_jobs(pagination, filter).await
    }

    pub async fn job_task_counts(&self, job_id: &JobId) -> CoreResult<TaskCounts> {
        self.repository.job_task_counts(job_id).await
    }

    pub async fn job_statistics(&self, filter: JobFilter) -> CoreResult<JobStatistics> {
        self.repository.job_statistics(filter).await
    }

    async fn all_tasks_for_job(&self, job_id: &JobId) -> CoreResult<Vec<Task>> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let batch = self
                .repository
                .list_tasks_by_job(job_id, Pagination::new(page, Pagination::MAX_SIZE), None)
                .await?;
            let got = batch.items.len();
            all.extend(batch.items);
            if !batch.has_next || got == 0 {
                break;
            }
            page += 1;
        }
        Ok(all)
    }
}

#[async_trait]
impl JobRederiver for JobService {
    /// `derive_job_status` applied after a task mutation (§4.8): if the
    /// derived status differs from what's stored, reconcile it.
    async fn rederive(&self, job_id: &JobId) -> CoreResult<()> {
        let job = self
            .repository
            .get_job(job_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("job {job_id} not found")))?;

        let tasks = self.all_tasks_for_job(job_id).await?;
        let derivation = derive_job_status(&tasks);

        if derivation.status == job.status {
            return Ok(());
        }

        info!(job_id = %job_id, from = ?job.status, to = ?derivation.status, "re-deriving job status");
        self.repository
            .set_job_status(job_id, derivation.status, derivation.error_message)
            .await
    }
}
