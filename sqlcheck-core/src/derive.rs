//! `derive_job_status` (§4.8): a pure function of a Job's Tasks, called
//! after every task mutation so stored Job status never drifts from what
//! its Tasks actually imply.

use sqlcheck_types::model::{JobStatus, Task, TaskStatus};

pub struct Derivation {
    pub status: JobStatus,
    pub error_message: Option<String>,
}

pub fn derive_job_status(tasks: &[Task]) -> Derivation {
    if tasks.is_empty() {
        return Derivation {
            status: JobStatus::Accepted,
            error_message: None,
        };
    }

    let (ignored, effective): (Vec<&Task>, Vec<&Task>) = tasks.iter().partition(|t| t.is_invalid_sql_skip());
    let _ = ignored;

    if effective.is_empty() {
        return Derivation {
            status: JobStatus::Failed,
            error_message: Some("no valid SQL files".to_string()),
        };
    }

    let all_success = effective.iter().all(|t| t.status == TaskStatus::Success);
    let any_success = effective.iter().any(|t| t.status == TaskStatus::Success);
    let all_failure = effective.iter().all(|t| t.status == TaskStatus::Failure);

    let status = if all_success {
        JobStatus::Completed
    } else if any_success {
        JobStatus::PartiallyCompleted
    } else if all_failure {
        JobStatus::Failed
    } else {
        JobStatus::Processing
    };

    Derivation {
        status,
        error_message: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlcheck_types::ids::{now, JobId, TaskId};
    use sqlcheck_types::model::INVALID_SQL_SKIP_MARKER;

    fn task(status: TaskStatus, error_message: Option<&str>) -> Task {
        Task {
            task_id: TaskId::new(),
            job_id: JobId::new(),
            status,
            source_file_path: "jobs/x/a.sql".into(),
            result_file_path: if status == TaskStatus::Success { Some("r.json".into()) } else { None },
            error_message: error_message.map(String::from),
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn empty_task_list_is_accepted() {
        assert_eq!(derive_job_status(&[]).status, JobStatus::Accepted);
    }

    #[test]
    fn all_success_is_completed() {
        let tasks = vec![task(TaskStatus::Success, None), task(TaskStatus::Success, None)];
        assert_eq!(derive_job_status(&tasks).status, JobStatus::Completed);
    }

    #[test]
    fn mixed_success_and_failure_is_partially_completed() {
        let tasks = vec![task(TaskStatus::Success, None), task(TaskStatus::Failure, Some("boom"))];
        assert_eq!(derive_job_status(&tasks).status, JobStatus::PartiallyCompleted);
    }

    #[test]
    fn all_failure_is_failed() {
        let tasks = vec![task(TaskStatus::Failure, Some("boom")), task(TaskStatus::Failure, Some("boom2"))];
        assert_eq!(derive_job_status(&tasks).status, JobStatus::Failed);
    }

    #[test]
    fn pending_or_in_progress_tasks_keep_it_processing() {
        let tasks = vec![task(TaskStatus::Success, None), task(TaskStatus::Pending, None)];
        assert_eq!(derive_job_status(&tasks).status, JobStatus::Processing);
    }

    #[test]
    fn all_ignored_invalid_sql_skips_is_failed_with_marker_message() {
        let marker = format!("{INVALID_SQL_SKIP_MARKER}: a.sql");
        let tasks = vec![task(TaskStatus::Failure, Some(&marker))];
        let derivation = derive_job_status(&tasks);
        assert_eq!(derivation.status, JobStatus::Failed);
        assert_eq!(derivation.error_message.as_deref(), Some("no valid SQL files"));
    }

    #[test]
    fn ignored_skips_are_excluded_from_an_otherwise_successful_job() {
        let marker = format!("{INVALID_SQL_SKIP_MARKER}: b.sql");
        let tasks = vec![task(TaskStatus::Success, None), task(TaskStatus::Failure, Some(&marker))];
        assert_eq!(derive_job_status(&tasks).status, JobStatus::Completed);
    }
}
