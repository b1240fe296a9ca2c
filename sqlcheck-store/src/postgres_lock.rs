//! Postgres-backed `LockService`, built on a plain `task_locks` table rather
//! than session-scoped `pg_advisory_lock` (grounded in the `database::locks`
//! module): a TTL row survives the holder's connection
//! dying, which `pg_advisory_lock` does not, and a worker process holds many
//! concurrent leases against a pooled connection rather than one dedicated
//! session per lock.

use async_trait::async_trait;
use sqlx::PgPool;

use sqlcheck_types::error::{CoreError, CoreResult};

use crate::lock::{Lease, LockService};

pub struct PostgresLockService {
    pool: PgPool,
}

impl PostgresLockService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockService for PostgresLockService {
    async fn acquire(&self, key: &str, holder: &str, ttl: std::time::Duration) -> CoreResult<Lease> {
        let ttl_secs = ttl.as_secs() as f64;
        let row = sqlx::query_as::<_, (String,)>(
            "INSERT INTO task_locks (key, holder, expires_at)
             VALUES ($1, $2, now() + ($3 || ' seconds')::interval)
             ON CONFLICT (key) DO UPDATE
               SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at
               WHERE task_locks.expires_at < now() OR task_locks.holder = EXCLUDED.holder
             RETURNING holder",
        )
        .bind(key)
        .bind(holder)
        .bind(ttl_secs.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::Lock(e.to_string()))?;

        match row {
            Some((held_by,)) if held_by == holder => {
                let expires_at = sqlcheck_types::ids::now()
                    + chrono::Duration::from_std(ttl).unwrap_or_default();
                Ok(Lease {
                    key: key.to_string(),
                    holder: holder.to_string(),
                    expires_at,
                })
            }
            _ => Err(CoreError::Lock(format!("{key} is held by another worker"))),
        }
    }

    async fn release(&self, lease: &Lease) -> CoreResult<()> {
        sqlx::query("DELETE FROM task_locks WHERE key = $1 AND holder = $2")
            .bind(&lease.key)
            .bind(&lease.holder)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Lock(e.to_string()))?;
        Ok(())
    }

    async fn renew(&self, lease: &Lease, ttl: std::time::Duration) -> CoreResult<Lease> {
        let ttl_secs = ttl.as_secs() as f64;
        let updated = sqlx::query(
            "UPDATE task_locks SET expires_at = now() + ($1 || ' seconds')::interval
             WHERE key = $2 AND holder = $3",
        )
        .bind(ttl_secs.to_string())
        .bind(&lease.key)
        .bind(&lease.holder)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Lock(e.to_string()))?;

        if updated.rows_affected() == 0 {
            return Err(CoreError::Lock(format!("lease on {} no longer held", lease.key)));
        }
        Ok(Lease {
            key: lease.key.clone(),
            holder: lease.holder.clone(),
            expires_at: sqlcheck_types::ids::now() + chrono::Duration::from_std(ttl).unwrap_or_default(),
        })
    }
}
