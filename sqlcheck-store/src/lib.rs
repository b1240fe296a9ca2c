//! The Job/Task repository (C3) and task lock service (C6).

pub mod lock;
pub mod memory_repository;
pub mod repository;
pub mod transitions;

#[cfg(feature = "postgres")]
pub mod postgres_lock;
#[cfg(feature = "postgres")]
pub mod postgres_repository;

pub use lock::{Lease, LockService, MemoryLockService};
pub use memory_repository::MemoryRepository;
pub use repository::{JobFilter, JobStatistics, Repository};

#[cfg(feature = "postgres")]
pub use postgres_lock::PostgresLockService;
#[cfg(feature = "postgres")]
pub use postgres_repository::PostgresRepository;
