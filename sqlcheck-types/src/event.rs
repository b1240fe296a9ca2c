//! The event envelope (§4.2): a tagged sum over event type, each carrying a
//! typed payload record, with unknown fields preserved in an `extensions`
//! bag rather than dropped (§9 redesign note).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{now, DateTime, EventId, RequestId, Utc, WorkerId};
use crate::model::JobStatus;

/// The batch triplet carried from a request through to its result events so
/// an external aggregator can reconstruct per-archive outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTriplet {
    pub batch_id: crate::ids::BatchId,
    pub file_index: u32,
    pub total_files: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlCheckRequested {
    pub job_id: crate::ids::JobId,
    pub task_id: crate::ids::TaskId,
    pub file_name: String,
    pub sql_file_path: String,
    pub dialect: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_rules: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_overrides: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchTriplet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlCheckCompleted {
    pub job_id: crate::ids::JobId,
    pub task_id: crate::ids::TaskId,
    pub file_name: String,
    pub result: Value,
    pub result_file_path: String,
    pub processing_duration_ms: u64,
    pub worker_id: WorkerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchTriplet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlCheckFailed {
    pub job_id: crate::ids::JobId,
    pub task_id: crate::ids::TaskId,
    pub file_name: String,
    pub error: ErrorDetail,
    pub worker_id: WorkerId,
    #[serde(default)]
    pub retries_exhausted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchTriplet>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkerStatus {
    Idle,
    Busy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_id: WorkerId,
    pub current_tasks: u32,
    pub total_processed: u64,
    pub uptime_seconds: u64,
    pub status: WorkerStatus,
}

/// A job re-derivation notice, raised whenever a task mutation should cause
/// `derive_job_status` to run. Not part of the wire contract in §4.2, but
/// travels the same bus infrastructure (§4.8: "triggers job re-derivation in
/// C8 directly or via a result event on C7").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRederiveRequested {
    pub job_id: crate::ids::JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    SqlCheckRequested(SqlCheckRequested),
    SqlCheckCompleted(SqlCheckCompleted),
    SqlCheckFailed(SqlCheckFailed),
    WorkerHeartbeat(WorkerHeartbeat),
    JobRederiveRequested(JobRederiveRequested),
}

impl EventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::SqlCheckRequested(_) => "SqlCheckRequested",
            EventPayload::SqlCheckCompleted(_) => "SqlCheckCompleted",
            EventPayload::SqlCheckFailed(_) => "SqlCheckFailed",
            EventPayload::WorkerHeartbeat(_) => "WorkerHeartbeat",
            EventPayload::JobRederiveRequested(_) => "JobRederiveRequested",
        }
    }
}

/// The canonical wire record: every event on either bus channel is one of
/// these, JSON-encoded. Unknown top-level keys observed on decode are kept
/// verbatim in `extensions` and re-emitted on re-encode, so an intermediary
/// that doesn't understand a newer field still forwards it untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event_id: EventId,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: RequestId,
    #[serde(flatten)]
    pub payload: EventPayload,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl Envelope {
    pub fn new(correlation_id: RequestId, payload: EventPayload) -> Self {
        Self {
            event_id: EventId::new(),
            timestamp: now(),
            correlation_id,
            payload,
            extensions: Map::new(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

/// Also used for the legacy derivation-trigger status recorded alongside the
/// notice, purely for observability (`tracing` fields, not business logic).
pub fn describe_status(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Accepted => "ACCEPTED",
        JobStatus::Processing => "PROCESSING",
        JobStatus::Completed => "COMPLETED",
        JobStatus::PartiallyCompleted => "PARTIALLY_COMPLETED",
        JobStatus::Failed => "FAILED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{JobId, TaskId};

    #[test]
    fn unknown_top_level_fields_survive_decode_encode_round_trip() {
        let correlation = RequestId::new();
        let envelope = Envelope::new(
            correlation.clone(),
            EventPayload::SqlCheckRequested(SqlCheckRequested {
                job_id: JobId::new(),
                task_id: TaskId::new(),
                file_name: "a.sql".into(),
                sql_file_path: "jobs/x/a.sql".into(),
                dialect: "ansi".into(),
                rules: None,
                exclude_rules: None,
                config_overrides: None,
                batch: None,
                user_id: None,
                product_name: None,
            }),
        );

        let mut encoded = serde_json::to_value(&envelope).unwrap();
        encoded
            .as_object_mut()
            .unwrap()
            .insert("future_field".into(), Value::String("x".into()));

        let decoded: Envelope = serde_json::from_value(encoded.clone()).unwrap();
        assert_eq!(decoded.correlation_id, correlation);
        assert_eq!(
            decoded.extensions.get("future_field"),
            Some(&Value::String("x".into()))
        );

        let re_encoded = serde_json::to_value(&decoded).unwrap();
        assert_eq!(
            re_encoded.get("future_field"),
            Some(&Value::String("x".into()))
        );
    }

    #[test]
    fn event_type_matches_payload_variant() {
        let envelope = Envelope::new(
            RequestId::new(),
            EventPayload::WorkerHeartbeat(WorkerHeartbeat {
                worker_id: WorkerId::new(),
                current_tasks: 0,
                total_processed: 0,
                uptime_seconds: 0,
                status: WorkerStatus::Idle,
            }),
        );
        assert_eq!(envelope.event_type(), "WorkerHeartbeat");
    }
}
