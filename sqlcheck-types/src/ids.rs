//! Typed, prefixed identifiers (`job-…`, `task-…`, …) and the UTC clock.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid identifier {value:?}: expected prefix {expected_prefix:?}")]
pub struct IdError {
    pub value: String,
    pub expected_prefix: &'static str,
}

macro_rules! prefixed_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            fn pattern() -> &'static Regex {
                static PATTERN: OnceLock<Regex> = OnceLock::new();
                PATTERN.get_or_init(|| {
                    Regex::new(concat!(
                        "^",
                        $prefix,
                        r"-[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$"
                    ))
                    .expect("static id regex must compile")
                })
            }

            /// Generate a fresh identifier of the form `<prefix>-<uuid4>`.
            pub fn new() -> Self {
                Self(format!("{}-{}", $prefix, Uuid::new_v4()))
            }

            pub fn parse(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                if Self::pattern().is_match(&value) {
                    Ok(Self(value))
                } else {
                    Err(IdError {
                        value,
                        expected_prefix: $prefix,
                    })
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

prefixed_id!(JobId, "job");
prefixed_id!(TaskId, "task");
prefixed_id!(RequestId, "req");
prefixed_id!(EventId, "evt");
prefixed_id!(BatchId, "batch");
prefixed_id!(WorkerId, "worker");

/// A worker's stable identity: `<hostname>-<pid>`. Kept distinct from
/// `WorkerId` (which is the wire-level prefixed id used to tag events) so a
/// worker process can log its host/pid pair even before it has generated one.
pub fn worker_identity(hostname: &str, pid: u32) -> String {
    format!("{hostname}-{pid}")
}

pub use chrono::{DateTime, Utc};

/// Current UTC timestamp. A single call site so that tests (and, in the
/// future, a deterministic clock) have one seam to replace.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// ISO-8601 UTC with microsecond precision, the one wire format this system
/// emits timestamps in (§4.1).
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_round_trips_through_parse() {
        let id = JobId::new();
        let parsed = JobId::parse(id.as_str()).expect("freshly generated id must parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_wrong_prefix() {
        let task_shaped = format!("task-{}", Uuid::new_v4());
        assert!(JobId::parse(task_shaped).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(JobId::parse("job-not-a-uuid").is_err());
    }

    #[test]
    fn timestamp_has_microsecond_precision_and_utc_marker() {
        let ts = now();
        let formatted = format_timestamp(ts);
        assert!(formatted.ends_with('Z'));
        assert_eq!(formatted.split('.').nth(1).map(|s| s.len()), Some(7)); // 6 digits + 'Z'
    }
}
