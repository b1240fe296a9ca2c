//! Task Service (C9): batch task creation (used by `JobService::decompose`)
//! and the read-side operations the Control API needs for a single task,
//! including attaching the result artifact to its task record.

use std::sync::Arc;

use serde_json::Value;

use sqlcheck_filestore::FileStore;
use sqlcheck_store::Repository;
use sqlcheck_types::error::{CoreError, CoreResult};
use sqlcheck_types::ids::TaskId;
use sqlcheck_types::model::{Page, Pagination, Task, TaskStatus};

#[derive(Clone)]
pub struct TaskService {
    repository: Arc<dyn Repository>,
    filestore: Arc<dyn FileStore>,
}

impl TaskService {
    pub fn new(repository: Arc<dyn Repository>, filestore: Arc<dyn FileStore>) -> Self {
        Self { repository, filestore }
    }

    pub async fn get_task(&self, task_id: &TaskId) -> CoreResult<Option<Task>> {
        self.repository.get_task(task_id).await
    }

    pub async fn list_tasks_by_job(
        &self,
        job_id: &sqlcheck_types::ids::JobId,
        pagination: Pagination,
        status: Option<TaskStatus>,
    ) -> CoreResult<Page<Task>> {
        self.repository.list_tasks_by_job(job_id, pagination, status).await
    }

    pub async fn list_tasks(
        &self,
        pagination: Pagination,
        job_id: Option<sqlcheck_types::ids::JobId>,
        status: Option<TaskStatus>,
    ) -> CoreResult<Page<Task>> {
        self.repository.list_tasks(pagination, job_id, status).await
    }

    /// §4.9: the stored result artifact with `file_info.file_path` filled
    /// in from the task record, since the analyzer itself never learns the
    /// path it was invoked under.
    pub async fn get_task_result(&self, task_id: &TaskId) -> CoreResult<Value> {
        let task = self
            .repository
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id} not found")))?;

        if task.status != TaskStatus::Success {
            return Err(CoreError::Conflict(format!(
                "task {task_id} has no result yet (status {:?})",
                task.status
            )));
        }
        let result_path = task
            .result_file_path
            .as_deref()
            .ok_or_else(|| CoreError::Repository(format!("task {task_id} is SUCCESS with no result_file_path")))?;

        let raw = self.filestore.read_text(result_path).await?;
        let mut result: Value = serde_json::from_str(&raw)
            .map_err(|e| CoreError::FileAccess(format!("corrupt result artifact for task {task_id}: {e}")))?;

        if let Some(file_info) = result.get_mut("file_info").and_then(Value::as_object_mut) {
            file_info.insert("file_path".to_string(), Value::String(task.source_file_path.clone()));
        }

        Ok(result)
    }

    /// Raw bytes of the result artifact, for the download endpoint.
    pub async fn get_task_result_raw(&self, task_id: &TaskId) -> CoreResult<String> {
        let task = self
            .repository
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id} not found")))?;
        let result_path = task
            .result_file_path
            .as_deref()
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id} has no result artifact")))?;
        self.filestore.read_text(result_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlcheck_filestore::LocalFileStore;
    use sqlcheck_store::MemoryRepository;
    use sqlcheck_types::ids::{now, JobId};
    use sqlcheck_types::model::{Job, JobStatus, SubmissionType};
    use tempfile::tempdir;

    fn sample_job(job_id: JobId) -> Job {
        let ts = now();
        Job {
            job_id,
            submission_type: SubmissionType::SingleFile,
            source_path: "jobs/x/a.sql".into(),
            dialect: "ansi".into(),
            status: JobStatus::Processing,
            user_id: "u".into(),
            product_name: "p".into(),
            error_message: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    fn sample_task(job_id: JobId, task_id: TaskId) -> Task {
        let ts = now();
        Task {
            task_id,
            job_id,
            status: TaskStatus::Pending,
            source_file_path: "jobs/x/a.sql".into(),
            result_file_path: None,
            error_message: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[tokio::test]
    async fn get_task_result_attaches_file_path_to_file_info() {
        let dir = tempdir().unwrap();
        let filestore: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(dir.path(), 1000));
        let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let service = TaskService::new(repository.clone(), filestore.clone());

        let job_id = JobId::new();
        repository.create_job(sample_job(job_id.clone())).await.unwrap();
        let task_id = TaskId::new();
        let mut task = sample_task(job_id, task_id.clone());
        task.status = TaskStatus::Success;
        task.result_file_path = Some("jobs/x/tasks/t/result.json".into());
        repository.create_task(task).await.unwrap();
        repository
            .set_task_status(
                &task_id,
                TaskStatus::Success,
                Some("jobs/x/tasks/t/result.json".into()),
                None,
            )
            .await
            .unwrap();

        filestore
            .write_json(
                "jobs/x/tasks/t/result.json",
                &serde_json::json!({"violations": [], "summary": {}, "file_info": {"file_name": "a.sql"}, "analysis_metadata": {}}),
            )
            .await
            .unwrap();

        let result = service.get_task_result(&task_id).await.unwrap();
        assert_eq!(result["file_info"]["file_path"], serde_json::json!("jobs/x/a.sql"));
    }

    #[tokio::test]
    async fn get_task_result_rejects_a_non_success_task() {
        let dir = tempdir().unwrap();
        let filestore: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(dir.path(), 1000));
        let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let service = TaskService::new(repository.clone(), filestore);

        let job_id = JobId::new();
        repository.create_job(sample_job(job_id.clone())).await.unwrap();
        let task_id = TaskId::new();
        repository.create_task(sample_task(job_id, task_id.clone())).await.unwrap();

        let err = service.get_task_result(&task_id).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }
}
