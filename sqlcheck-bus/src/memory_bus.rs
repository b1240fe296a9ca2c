//! `tokio::sync::mpsc`-backed `Bus`, for tests and non-Postgres dev mode.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use sqlcheck_types::error::{CoreError, CoreResult};
use sqlcheck_types::event::Envelope;

use crate::bus::Bus;

pub struct InMemoryBus {
    request_tx: mpsc::UnboundedSender<Envelope>,
    request_rx: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    result_tx: mpsc::UnboundedSender<Envelope>,
    result_rx: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    heartbeat_tx: mpsc::UnboundedSender<Envelope>,
    heartbeat_rx: Mutex<mpsc::UnboundedReceiver<Envelope>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let (heartbeat_tx, heartbeat_rx) = mpsc::unbounded_channel();
        Self {
            request_tx,
            request_rx: Mutex::new(request_rx),
            result_tx,
            result_rx: Mutex::new(result_rx),
            heartbeat_tx,
            heartbeat_rx: Mutex::new(heartbeat_rx),
        }
    }

    /// Drains any pending heartbeats, newest last. Exposed for the Control
    /// API / tests to inspect worker liveness without a database.
    pub async fn drain_heartbeats(&self) -> Vec<Envelope> {
        let mut rx = self.heartbeat_rx.lock().await;
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            out.push(envelope);
        }
        out
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn publish_request(&self, envelope: Envelope) -> CoreResult<()> {
        self.request_tx
            .send(envelope)
            .map_err(|_| CoreError::Bus("request channel closed".to_string()))
    }

    async fn publish_result(&self, envelope: Envelope) -> CoreResult<()> {
        self.result_tx
            .send(envelope)
            .map_err(|_| CoreError::Bus("result channel closed".to_string()))
    }

    async fn publish_heartbeat(&self, envelope: Envelope) -> CoreResult<()> {
        self.heartbeat_tx
            .send(envelope)
            .map_err(|_| CoreError::Bus("heartbeat channel closed".to_string()))
    }

    async fn recv_request(&self) -> CoreResult<Option<Envelope>> {
        Ok(self.request_rx.lock().await.try_recv().ok())
    }

    async fn recv_result(&self) -> CoreResult<Option<Envelope>> {
        Ok(self.result_rx.lock().await.try_recv().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlcheck_types::event::{EventPayload, SqlCheckRequested};
    use sqlcheck_types::ids::{JobId, RequestId, TaskId};

    fn sample_request_envelope() -> Envelope {
        Envelope::new(
            RequestId::new(),
            EventPayload::SqlCheckRequested(SqlCheckRequested {
                job_id: JobId::new(),
                task_id: TaskId::new(),
                file_name: "a.sql".into(),
                sql_file_path: "jobs/x/sources/a.sql".into(),
                dialect: "ansi".into(),
                rules: None,
                exclude_rules: None,
                config_overrides: None,
                batch: None,
                user_id: Some("u".into()),
                product_name: Some("p".into()),
            }),
        )
    }

    #[tokio::test]
    async fn recv_returns_none_when_empty() {
        let bus = InMemoryBus::new();
        assert!(bus.recv_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publish_then_recv_round_trips_in_order() {
        let bus = InMemoryBus::new();
        let first = sample_request_envelope();
        let second = sample_request_envelope();
        let first_id = first.event_id.clone();
        let second_id = second.event_id.clone();
        bus.publish_request(first).await.unwrap();
        bus.publish_request(second).await.unwrap();

        let got_first = bus.recv_request().await.unwrap().unwrap();
        let got_second = bus.recv_request().await.unwrap().unwrap();
        assert_eq!(got_first.event_id, first_id);
        assert_eq!(got_second.event_id, second_id);
        assert!(bus.recv_request().await.unwrap().is_none());
    }
}
