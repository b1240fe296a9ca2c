//! The control-plane business logic (C8/C9): job decomposition, aggregate
//! status derivation, and task read/write operations, assembled over the
//! `sqlcheck-store`/`sqlcheck-filestore`/`sqlcheck-bus` adapters.

pub mod derive;
pub mod job_service;
pub mod task_service;

pub use derive::{derive_job_status, Derivation};
pub use job_service::{CreateJobRequest, JobRederiver, JobService};
pub use task_service::TaskService;
