//! Worker process binary (C10): subscribes to `sql_check_requests`,
//! executes under lock with retry/backoff, publishes result events.
//!
//! ```bash
//! SHARED_ROOT=/var/lib/sqlcheck DATABASE_URL=postgresql://localhost/sqlcheck \
//!     cargo run --bin sqlcheck-worker --features postgres
//! ```

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;

use sqlcheck_analyzer::{Analyzer, SqlFluffAdapter};
use sqlcheck_bus::{Bus, PostgresBus};
use sqlcheck_core::{JobRederiver, JobService};
use sqlcheck_filestore::{FileStore, LocalFileStore};
use sqlcheck_store::{LockService, PostgresLockService, PostgresRepository, Repository};
use sqlcheck_types::config::Config;
use sqlcheck_worker::{Worker, WorkerSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let repository: Arc<dyn Repository> = Arc::new(PostgresRepository::new(pool.clone()));
    let filestore: Arc<dyn FileStore> = Arc::new(
        LocalFileStore::new(config.shared_root.clone(), config.max_archive_entries)
            .with_max_file_bytes(config.max_file_bytes),
    );
    let bus: Arc<dyn Bus> = Arc::new(PostgresBus::new(pool.clone()));
    let locks: Arc<dyn LockService> = Arc::new(PostgresLockService::new(pool.clone()));
    let analyzer: Arc<dyn Analyzer> = Arc::new(SqlFluffAdapter::default());

    let jobs = JobService::new(
        repository.clone(),
        filestore.clone(),
        bus.clone(),
        locks.clone(),
        config.dialect_default.clone(),
        config.task_lock_ttl(),
    );
    let rederiver: Arc<dyn JobRederiver> = Arc::new(jobs);

    let settings = WorkerSettings {
        concurrency: config.worker_concurrency,
        task_lock_ttl: config.task_lock_ttl(),
        retry_max: config.task_retry_max,
        retry_base_backoff_seconds: config.task_retry_base_backoff_seconds,
        soft_timeout: config.task_soft_timeout(),
        hard_timeout: config.task_hard_timeout(),
        heartbeat_interval: config.heartbeat_interval(),
        bus_poll_interval: config.bus_poll_interval(),
    };

    let hostname = hostname_string();
    let pid = std::process::id();
    let worker = Arc::new(Worker::new(
        &hostname, pid, repository, filestore, analyzer, bus, locks, rederiver, settings,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await;
    Ok(())
}

fn hostname_string() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "sqlcheck-worker".to_string())
}
