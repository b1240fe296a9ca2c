//! Relative-path helpers for the shared root's directory convention:
//! `get_job_directory` / `get_task_source_path` / `get_task_result_path`.

use sqlcheck_types::ids::{JobId, TaskId};

pub fn job_dir(job_id: &JobId) -> String {
    format!("jobs/{job_id}")
}

pub fn task_source_path(job_id: &JobId, task_id: &TaskId, file_name: &str) -> String {
    format!("{}/sources/{task_id}_{file_name}", job_dir(job_id))
}

/// §6.3: `results/<job_id>/<file_name>_result.json`, or
/// `results/<job_id>/<task_id>_result.json` when no file name is known
/// (§4.10 step 7). Lives directly under the top-level `results/` tree, not
/// under the job's own directory, since results are the output of analysis
/// rather than an input artifact the job owns.
pub fn task_result_path(job_id: &JobId, task_id: &TaskId, file_name: Option<&str>) -> String {
    match file_name {
        Some(name) if !name.is_empty() => format!("results/{job_id}/{name}_result.json"),
        _ => format!("results/{job_id}/{task_id}_result.json"),
    }
}

pub fn archive_extract_dir(job_id: &JobId) -> String {
    format!("{}/extracted", job_dir(job_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_source_path_embeds_task_id_and_file_name() {
        let job_id = JobId::new();
        let task_id = TaskId::new();
        let path = task_source_path(&job_id, &task_id, "report.sql");
        assert!(path.starts_with(&job_dir(&job_id)));
        assert!(path.ends_with(&format!("{task_id}_report.sql")));
    }

    #[test]
    fn task_result_path_lives_under_top_level_results_by_file_name() {
        let job_id = JobId::new();
        let task_id = TaskId::new();
        let path = task_result_path(&job_id, &task_id, Some("report.sql"));
        assert_eq!(path, format!("results/{job_id}/report.sql_result.json"));
    }

    #[test]
    fn task_result_path_falls_back_to_task_id_without_a_file_name() {
        let job_id = JobId::new();
        let task_id = TaskId::new();
        let path = task_result_path(&job_id, &task_id, None);
        assert_eq!(path, format!("results/{job_id}/{task_id}_result.json"));
    }
}
