//! C6: the task lock service (§4.6), preventing two workers from executing
//! the same task concurrently and serializing zip expansion per job.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use sqlcheck_types::error::{CoreError, CoreResult};

/// A held lease. Dropping it without calling `release` leaves the lease to
/// expire naturally at `expires_at` — the TTL is the safety net, not the
/// `Drop` impl.
#[derive(Debug, Clone)]
pub struct Lease {
    pub key: String,
    pub holder: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
pub trait LockService: Send + Sync {
    /// Acquires `key` for `ttl`, or returns `CoreError::Lock` if another
    /// holder's lease hasn't expired yet.
    async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> CoreResult<Lease>;
    async fn release(&self, lease: &Lease) -> CoreResult<()>;
    /// Extends an already-held lease by `ttl` from now, for tasks whose
    /// analysis runs long (§4.10 soft timeout heartbeat).
    async fn renew(&self, lease: &Lease, ttl: Duration) -> CoreResult<Lease>;
}

struct Holding {
    holder: String,
    expires_at: Instant,
}

/// `tokio::sync::Mutex<HashMap<String, Instant>>`-style in-memory lock for
/// tests and single-process dev, mirroring the advisory-lock module's shape
/// reduced to a single process.
pub struct MemoryLockService {
    held: Mutex<HashMap<String, Holding>>,
}

impl MemoryLockService {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryLockService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockService for MemoryLockService {
    async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> CoreResult<Lease> {
        let mut held = self.held.lock().await;
        let now = Instant::now();
        if let Some(existing) = held.get(key) {
            if existing.expires_at > now && existing.holder != holder {
                return Err(CoreError::Lock(format!("{key} is held by {}", existing.holder)));
            }
        }
        held.insert(
            key.to_string(),
            Holding {
                holder: holder.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(Lease {
            key: key.to_string(),
            holder: holder.to_string(),
            expires_at: sqlcheck_types::ids::now() + chrono::Duration::from_std(ttl).unwrap_or_default(),
        })
    }

    async fn release(&self, lease: &Lease) -> CoreResult<()> {
        let mut held = self.held.lock().await;
        if let Some(existing) = held.get(&lease.key) {
            if existing.holder == lease.holder {
                held.remove(&lease.key);
            }
        }
        Ok(())
    }

    async fn renew(&self, lease: &Lease, ttl: Duration) -> CoreResult<Lease> {
        let mut held = self.held.lock().await;
        let now = Instant::now();
        match held.get_mut(&lease.key) {
            Some(existing) if existing.holder == lease.holder => {
                existing.expires_at = now + ttl;
                Ok(Lease {
                    key: lease.key.clone(),
                    holder: lease.holder.clone(),
                    expires_at: sqlcheck_types::ids::now()
                        + chrono::Duration::from_std(ttl).unwrap_or_default(),
                })
            }
            _ => Err(CoreError::Lock(format!("lease on {} no longer held", lease.key))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_before_expiry_is_rejected() {
        let locks = MemoryLockService::new();
        let lease = locks.acquire("expand_zip_job-1", "worker-a", Duration::from_secs(60)).await.unwrap();
        let err = locks
            .acquire("expand_zip_job-1", "worker-b", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Lock(_)));
        locks.release(&lease).await.unwrap();
    }

    #[tokio::test]
    async fn release_allows_a_new_holder() {
        let locks = MemoryLockService::new();
        let lease = locks.acquire("task-1", "worker-a", Duration::from_secs(60)).await.unwrap();
        locks.release(&lease).await.unwrap();
        locks.acquire("task-1", "worker-b", Duration::from_secs(60)).await.unwrap();
    }

    #[tokio::test]
    async fn expired_lease_can_be_reacquired_by_another_holder() {
        let locks = MemoryLockService::new();
        locks.acquire("task-1", "worker-a", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        locks.acquire("task-1", "worker-b", Duration::from_secs(60)).await.unwrap();
    }

    #[tokio::test]
    async fn renew_extends_only_the_current_holder() {
        let locks = MemoryLockService::new();
        let lease = locks.acquire("task-1", "worker-a", Duration::from_secs(1)).await.unwrap();
        let renewed = locks.renew(&lease, Duration::from_secs(60)).await.unwrap();
        assert_eq!(renewed.holder, "worker-a");
    }
}
