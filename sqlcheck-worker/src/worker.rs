//! The Worker (C10): three concurrent loops — intake, heartbeat, and
//! per-task execution — coordinated by a `tokio::sync::watch<bool>`
//! shutdown signal, the same shape as `TaskQueueListener::run`,
//! generalized from one polled queue to the
//! bus's three logical channels and from a single serial consumer to a
//! `tokio::sync::Semaphore`-bounded pool of concurrent task executions.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use sqlcheck_analyzer::{AnalyzeRequest, Analyzer};
use sqlcheck_bus::Bus;
use sqlcheck_core::JobRederiver;
use sqlcheck_filestore::paths::task_result_path;
use sqlcheck_filestore::FileStore;
use sqlcheck_store::{LockService, Repository};
use sqlcheck_types::error::{CoreError, CoreResult};
use sqlcheck_types::event::{
    BatchTriplet, Envelope, ErrorDetail, EventPayload, SqlCheckCompleted, SqlCheckFailed, WorkerHeartbeat,
    WorkerStatus,
};
use sqlcheck_types::ids::{worker_identity, JobId, RequestId, TaskId, WorkerId};
use sqlcheck_types::model::{TaskStatus, INVALID_SQL_SKIP_MARKER};

const ERROR_BACKOFF_MS: u64 = 1000;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub struct WorkerSettings {
    pub concurrency: usize,
    pub task_lock_ttl: Duration,
    pub retry_max: u32,
    pub retry_base_backoff_seconds: u64,
    pub soft_timeout: Duration,
    pub hard_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub bus_poll_interval: Duration,
}

impl WorkerSettings {
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.retry_base_backoff_seconds * 2u64.saturating_pow(attempt))
    }
}

pub struct Worker {
    worker_id: WorkerId,
    identity: String,
    repository: Arc<dyn Repository>,
    filestore: Arc<dyn FileStore>,
    analyzer: Arc<dyn Analyzer>,
    bus: Arc<dyn Bus>,
    locks: Arc<dyn LockService>,
    rederiver: Arc<dyn JobRederiver>,
    settings: WorkerSettings,
    current_tasks: AtomicU32,
    total_processed: AtomicU64,
    started_at: Instant,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hostname: &str,
        pid: u32,
        repository: Arc<dyn Repository>,
        filestore: Arc<dyn FileStore>,
        analyzer: Arc<dyn Analyzer>,
        bus: Arc<dyn Bus>,
        locks: Arc<dyn LockService>,
        rederiver: Arc<dyn JobRederiver>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            worker_id: WorkerId::new(),
            identity: worker_identity(hostname, pid),
            repository,
            filestore,
            analyzer,
            bus,
            locks,
            rederiver,
            settings,
            current_tasks: AtomicU32::new(0),
            total_processed: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Runs all three loops to completion, returning once `shutdown` fires
    /// and the grace period elapses (or every in-flight task finishes
    /// first, whichever comes first).
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.worker_id, identity = %self.identity, "worker starting");

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));

        let intake = {
            let worker = self.clone();
            let semaphore = semaphore.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.intake_loop(semaphore, shutdown).await })
        };
        let heartbeat = {
            let worker = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.heartbeat_loop(shutdown).await })
        };

        // Block here until told to shut down, then give in-flight work a
        // grace period before returning (same SIGINT/SIGTERM handling as the
        // server binaries, generalized to three loops instead of one HTTP
        // listener).
        let _ = shutdown.changed().await;
        info!(worker_id = %self.worker_id, "shutdown requested, waiting for in-flight tasks");

        let drain_deadline = tokio::time::sleep(SHUTDOWN_GRACE);
        tokio::pin!(drain_deadline);
        loop {
            if semaphore.available_permits() >= self.settings.concurrency {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                _ = &mut drain_deadline => {
                    warn!(worker_id = %self.worker_id, "shutdown grace period elapsed with tasks still in flight");
                    break;
                }
            }
        }

        intake.abort();
        heartbeat.abort();
        info!(worker_id = %self.worker_id, "worker stopped");
    }

    async fn intake_loop(self: Arc<Self>, semaphore: Arc<Semaphore>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => permit.expect("semaphore never closed"),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                    continue;
                }
            };

            match self.bus.recv_request().await {
                Ok(Some(envelope)) => {
                    let worker = self.clone();
                    tokio::spawn(async move {
                        worker.current_tasks.fetch_add(1, Ordering::SeqCst);
                        if let Err(e) = worker.handle_request(envelope).await {
                            error!(error = %e, "task execution failed terminally");
                        }
                        worker.current_tasks.fetch_sub(1, Ordering::SeqCst);
                        worker.total_processed.fetch_add(1, Ordering::SeqCst);
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.bus_poll_interval) => {}
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "bus recv_request failed");
                    tokio::time::sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
                }
            }
        }
    }

    async fn heartbeat_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let current_tasks = self.current_tasks.load(Ordering::SeqCst);
            let envelope = Envelope::new(
                RequestId::new(),
                EventPayload::WorkerHeartbeat(WorkerHeartbeat {
                    worker_id: self.worker_id.clone(),
                    current_tasks,
                    total_processed: self.total_processed.load(Ordering::SeqCst),
                    uptime_seconds: self.started_at.elapsed().as_secs(),
                    status: if current_tasks > 0 { WorkerStatus::Busy } else { WorkerStatus::Idle },
                }),
            );
            if let Err(e) = self.bus.publish_heartbeat(envelope).await {
                warn!(error = %e, "failed to publish heartbeat");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.heartbeat_interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// One `SqlCheckRequested` envelope through to a terminal task state,
    /// with retry/backoff (§4.10). Does not return an error for a task
    /// that is legitimately skipped or already handled by another worker;
    /// only bus/internal failures bubble up.
    async fn handle_request(&self, envelope: Envelope) -> CoreResult<()> {
        let EventPayload::SqlCheckRequested(request) = envelope.payload else {
            return Err(CoreError::Validation("expected SqlCheckRequested payload".to_string()));
        };

        let lock_key = format!("task_lock:{}", request.task_id);
        let lease = match self.locks.acquire(&lock_key, &self.identity, self.settings.task_lock_ttl).await {
            Ok(lease) => lease,
            Err(_) => {
                debug!(task_id = %request.task_id, "task lock busy, another worker owns it");
                return Ok(());
            }
        };

        let mut attempt = 0u32;
        loop {
            match self.execute_once(&request.job_id, &request.task_id, &request.dialect, &request.batch).await {
                Ok(()) => break,
                Err(e) if !e.is_retriable() => {
                    self.fail_task(&request.job_id, &request.task_id, &e, false, &request.batch).await;
                    break;
                }
                Err(e) if attempt >= self.settings.retry_max => {
                    self.fail_task(&request.job_id, &request.task_id, &e, true, &request.batch).await;
                    break;
                }
                Err(e) => {
                    warn!(task_id = %request.task_id, attempt, error = %e, "retrying task execution");
                    tokio::time::sleep(self.settings.retry_backoff(attempt)).await;
                    attempt += 1;
                }
            }
        }

        if let Err(e) = self.locks.release(&lease).await {
            warn!(task_id = %request.task_id, error = %e, "failed releasing task lock");
        }
        Ok(())
    }

    /// Steps 1-9 of §4.10's execution sequence for a single attempt.
    async fn execute_once(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        request_dialect: &str,
        batch: &Option<BatchTriplet>,
    ) -> CoreResult<()> {
        let start_time = Instant::now();

        let task = self
            .repository
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id} not found")))?;
        if task.status != TaskStatus::Pending {
            return Ok(());
        }

        self.repository.set_task_status(task_id, TaskStatus::InProgress, None, None).await?;

        let job = self
            .repository
            .get_job(job_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("job {job_id} not found")))?;
        let dialect = if request_dialect.is_empty() { job.dialect.clone() } else { request_dialect.to_string() };

        let file_name = task.source_file_path.rsplit('/').next().unwrap_or(&task.source_file_path).to_string();

        if !self.filestore.is_valid_sql(&task.source_file_path).await? {
            let message = format!("{INVALID_SQL_SKIP_MARKER}: {file_name}");
            self.repository
                .set_task_status(task_id, TaskStatus::Failure, None, Some(message.clone()))
                .await?;
            self.publish_failed(job_id, task_id, &file_name, "INVALID_SQL_SKIP", &message, false, batch).await?;
            self.rederiver.rederive(job_id).await?;
            return Ok(());
        }

        let sql_text = self.filestore.read_text(&task.source_file_path).await?;
        let analyze_fut = self.analyzer.analyze(AnalyzeRequest {
            sql_text,
            file_name: file_name.clone(),
            dialect,
            rules: None,
            exclude_rules: None,
            config_overrides: None,
        });
        tokio::pin!(analyze_fut);

        // §5: a soft timeout warns but keeps waiting up to the hard ceiling;
        // only the hard ceiling actually fails the task.
        let analysis = match tokio::time::timeout(self.settings.soft_timeout, &mut analyze_fut).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(task_id = %task_id, "task exceeded soft timeout, waiting up to hard timeout");
                let remaining = self.settings.hard_timeout.saturating_sub(self.settings.soft_timeout);
                tokio::time::timeout(remaining, &mut analyze_fut)
                    .await
                    .map_err(|_| CoreError::Timeout(format!("task {task_id} exceeded hard timeout")))??
            }
        };

        let result_path = task_result_path(job_id, task_id, Some(&file_name));
        let result_json = serde_json::to_value(&analysis)
            .map_err(|e| CoreError::Analyzer(format!("failed serializing analysis result: {e}")))?;
        self.filestore.write_json(&result_path, &result_json).await?;

        self.repository
            .set_task_status(task_id, TaskStatus::Success, Some(result_path.clone()), None)
            .await?;

        let processing_duration_ms = start_time.elapsed().as_millis() as u64;
        let envelope = Envelope::new(
            RequestId::new(),
            EventPayload::SqlCheckCompleted(SqlCheckCompleted {
                job_id: job_id.clone(),
                task_id: task_id.clone(),
                file_name,
                result: result_json,
                result_file_path: result_path,
                processing_duration_ms,
                worker_id: self.worker_id.clone(),
                batch: batch.clone(),
            }),
        );
        self.bus.publish_result(envelope).await?;
        self.rederiver.rederive(job_id).await?;

        Ok(())
    }

    async fn fail_task(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        error: &CoreError,
        retries_exhausted: bool,
        batch: &Option<BatchTriplet>,
    ) {
        if let Err(e) = self
            .repository
            .set_task_status(task_id, TaskStatus::Failure, None, Some(error.to_string()))
            .await
        {
            error!(task_id = %task_id, error = %e, "failed to record task failure");
        }

        let file_name = match self.repository.get_task(task_id).await {
            Ok(Some(task)) => {
                task.source_file_path.rsplit('/').next().unwrap_or(&task.source_file_path).to_string()
            }
            _ => task_id.to_string(),
        };
        if let Err(e) = self
            .publish_failed(job_id, task_id, &file_name, error.kind(), &error.to_string(), retries_exhausted, batch)
            .await
        {
            error!(task_id = %task_id, error = %e, "failed publishing SqlCheckFailed");
        }

        if let Err(e) = self.rederiver.rederive(job_id).await {
            error!(job_id = %job_id, error = %e, "failed re-deriving job status after task failure");
        }
    }

    async fn publish_failed(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        file_name: &str,
        kind: &str,
        message: &str,
        retries_exhausted: bool,
        batch: &Option<BatchTriplet>,
    ) -> CoreResult<()> {
        let envelope = Envelope::new(
            RequestId::new(),
            EventPayload::SqlCheckFailed(SqlCheckFailed {
                job_id: job_id.clone(),
                task_id: task_id.clone(),
                file_name: file_name.to_string(),
                error: ErrorDetail {
                    code: kind.to_string(),
                    message: message.to_string(),
                    kind: kind.to_string(),
                },
                worker_id: self.worker_id.clone(),
                retries_exhausted,
                batch: batch.clone(),
            }),
        );
        self.bus.publish_result(envelope).await
    }
}
