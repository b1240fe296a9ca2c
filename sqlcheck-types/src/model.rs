//! Job and Task records (§3) plus the pagination envelope used throughout
//! the Repository and Control API.

use serde::{Deserialize, Serialize};

use crate::ids::{DateTime, JobId, TaskId, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionType {
    SingleFile,
    Archive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Accepted,
    Processing,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::PartiallyCompleted | JobStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub submission_type: SubmissionType,
    pub source_path: String,
    pub dialect: String,
    pub status: JobStatus,
    pub user_id: String,
    pub product_name: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub status: TaskStatus,
    pub source_file_path: String,
    pub result_file_path: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Invariant from §3: `result_file_path` is set iff the task is SUCCESS.
    pub fn has_consistent_result_field(&self) -> bool {
        (self.status == TaskStatus::Success) == self.result_file_path.is_some()
    }

    /// A task is classified as an "ignored skip" when it failed because the
    /// source file was rejected by `is_valid_sql` (§4.8 derivation step 2).
    pub fn is_invalid_sql_skip(&self) -> bool {
        self.status == TaskStatus::Failure
            && self
                .error_message
                .as_deref()
                .is_some_and(|msg| msg.starts_with(INVALID_SQL_SKIP_MARKER))
    }
}

/// The exact prefix `derive_job_status` (and the worker) use to mark a task
/// failure as an ignored invalid-SQL skip rather than an effective failure.
pub const INVALID_SQL_SKIP_MARKER: &str = "skipped invalid SQL file";

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskCounts {
    pub total: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub success: u64,
    pub failure: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: u32,
    pub size: u32,
}

impl Pagination {
    pub const MAX_SIZE: u32 = 100;

    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page: page.max(1),
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.size as u64
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, size: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        let pages = if total == 0 {
            0
        } else {
            ((total + pagination.size as u64 - 1) / pagination.size as u64) as u32
        };
        Self {
            items,
            total,
            page: pagination.page,
            size: pagination.size,
            has_next: pagination.page < pages,
            has_prev: pagination.page > 1,
            pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_computes_total_pages_and_flags() {
        let page: Page<i32> = Page::new(vec![1, 2, 3], 23, Pagination::new(2, 10));
        assert_eq!(page.pages, 3);
        assert!(page.has_next);
        assert!(page.has_prev);
    }

    #[test]
    fn empty_collection_has_zero_pages() {
        let page: Page<i32> = Page::new(vec![], 0, Pagination::new(1, 10));
        assert_eq!(page.pages, 0);
        assert!(!page.has_next);
        assert!(!page.has_prev);
    }

    #[test]
    fn invalid_sql_skip_is_detected_by_marker_prefix() {
        let task = Task {
            task_id: TaskId::new(),
            job_id: JobId::new(),
            status: TaskStatus::Failure,
            source_file_path: "jobs/x/y.sql".into(),
            result_file_path: None,
            error_message: Some(format!("{INVALID_SQL_SKIP_MARKER}: y.sql")),
            created_at: crate::ids::now(),
            updated_at: crate::ids::now(),
        };
        assert!(task.is_invalid_sql_skip());
        assert!(task.has_consistent_result_field());
    }
}
