//! Control API server binary (C11).
//!
//! ```bash
//! SHARED_ROOT=/var/lib/sqlcheck DATABASE_URL=postgresql://localhost/sqlcheck \
//!     cargo run --bin sqlcheck-api-server --features postgres
//!
//! curl -X POST http://localhost:8000/api/v1/jobs \
//!     -H "Content-Type: application/json" \
//!     -d '{"sql_content": "SELECT 1;", "dialect": "mysql", "user_id": "u", "product_name": "p"}'
//! ```

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;

use sqlcheck_api::{create_router, AppState};
use sqlcheck_bus::{Bus, PostgresBus};
use sqlcheck_core::{JobService, TaskService};
use sqlcheck_filestore::{FileStore, LocalFileStore};
use sqlcheck_store::{LockService, PostgresLockService, PostgresRepository, Repository};
use sqlcheck_types::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    tracing::info!(bind = %config.api_bind_addr, "starting Control API server");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../sqlcheck-store/migrations").run(&pool).await?;
    sqlx::migrate!("../sqlcheck-bus/migrations").run(&pool).await?;

    let repository: Arc<dyn Repository> = Arc::new(PostgresRepository::new(pool.clone()));
    let filestore: Arc<dyn FileStore> = Arc::new(
        LocalFileStore::new(config.shared_root.clone(), config.max_archive_entries)
            .with_max_file_bytes(config.max_file_bytes),
    );
    let bus: Arc<dyn Bus> = Arc::new(PostgresBus::new(pool.clone()));
    let locks: Arc<dyn LockService> = Arc::new(PostgresLockService::new(pool));

    let jobs = JobService::new(
        repository.clone(),
        filestore.clone(),
        bus,
        locks,
        config.dialect_default.clone(),
        config.task_lock_ttl(),
    );
    let tasks = TaskService::new(repository, filestore);
    let state = AppState::new(jobs, tasks);

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.api_bind_addr).await?;
    tracing::info!(bind = %config.api_bind_addr, "Control API listening");
    axum::serve(listener, app).await?;

    Ok(())
}
