//! The `Bus` trait (C7): three logical channels — requests, results, and
//! worker heartbeats — each consumed via an explicit `recv` poll rather
//! than a stream/generator (§9 redesign note: callers drive their own poll
//! loop, which is what both the in-memory and Postgres backends need
//! anyway for backoff-on-empty and shutdown-signal handling).

use async_trait::async_trait;

use sqlcheck_types::error::CoreResult;
use sqlcheck_types::event::Envelope;

#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish_request(&self, envelope: Envelope) -> CoreResult<()>;
    async fn publish_result(&self, envelope: Envelope) -> CoreResult<()>;
    async fn publish_heartbeat(&self, envelope: Envelope) -> CoreResult<()>;

    /// Pops and returns one pending request, or `None` if the queue is
    /// currently empty. Never blocks waiting for a new one — callers poll.
    async fn recv_request(&self) -> CoreResult<Option<Envelope>>;
    /// Pops and returns one pending result event (`SqlCheckCompleted`,
    /// `SqlCheckFailed`, or `JobRederiveRequested`), or `None` if empty.
    async fn recv_result(&self) -> CoreResult<Option<Envelope>>;
}
