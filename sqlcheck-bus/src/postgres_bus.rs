//! Postgres-backed `Bus`. Requests and results are each a queue table
//! drained with a `FOR UPDATE SKIP LOCKED` CTE pop
//! (`ob-workflow::listener::process_one`), giving safe concurrent
//! consumption by multiple worker processes with at-least-once delivery.
//! Heartbeats are not a queue — there is nothing that consumes them off the
//! bus API, only the latest one per worker for observability — so they're
//! just upserted into a small table.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use sqlcheck_types::error::{CoreError, CoreResult};
use sqlcheck_types::event::{Envelope, EventPayload};

use crate::bus::Bus;

pub struct PostgresBus {
    pool: PgPool,
}

impl PostgresBus {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> CoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CoreError::Bus(format!("migration failed: {e}")))
    }

    async fn publish(&self, table: &str, envelope: &Envelope) -> CoreResult<()> {
        let payload = serde_json::to_value(envelope).map_err(|e| CoreError::Bus(e.to_string()))?;
        let query = format!("INSERT INTO {table} (envelope, enqueued_at) VALUES ($1, now())");
        sqlx::query(&query)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Bus(e.to_string()))?;
        Ok(())
    }

    async fn pop(&self, table: &str) -> CoreResult<Option<Envelope>> {
        let query = format!(
            r#"
            WITH next AS (
                SELECT id FROM {table}
                WHERE processed_at IS NULL
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE {table} q
            SET processed_at = now()
            FROM next
            WHERE q.id = next.id
            RETURNING q.envelope
            "#
        );
        let row = sqlx::query(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Bus(e.to_string()))?;
        let Some(row) = row else { return Ok(None) };
        let value: serde_json::Value = row.try_get("envelope").map_err(|e| CoreError::Bus(e.to_string()))?;
        let envelope: Envelope = serde_json::from_value(value).map_err(|e| CoreError::Bus(e.to_string()))?;
        Ok(Some(envelope))
    }
}

#[async_trait]
impl Bus for PostgresBus {
    async fn publish_request(&self, envelope: Envelope) -> CoreResult<()> {
        self.publish("sql_check_requests", &envelope).await
    }

    async fn publish_result(&self, envelope: Envelope) -> CoreResult<()> {
        self.publish("sql_check_events", &envelope).await
    }

    async fn publish_heartbeat(&self, envelope: Envelope) -> CoreResult<()> {
        let EventPayload::WorkerHeartbeat(heartbeat) = &envelope.payload else {
            return Err(CoreError::Bus("publish_heartbeat requires a WorkerHeartbeat payload".to_string()));
        };
        let payload = serde_json::to_value(&envelope).map_err(|e| CoreError::Bus(e.to_string()))?;
        sqlx::query(
            "INSERT INTO worker_heartbeats (worker_id, envelope, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (worker_id) DO UPDATE SET envelope = EXCLUDED.envelope, updated_at = now()",
        )
        .bind(heartbeat.worker_id.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Bus(e.to_string()))?;
        Ok(())
    }

    async fn recv_request(&self) -> CoreResult<Option<Envelope>> {
        self.pop("sql_check_requests").await
    }

    async fn recv_result(&self) -> CoreResult<Option<Envelope>> {
        self.pop("sql_check_events").await
    }
}
