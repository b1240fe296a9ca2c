//! The long-running consumer process (C10): subscribes to request events,
//! executes under a task lock with retry/backoff, publishes result events.

pub mod worker;

pub use worker::{Worker, WorkerSettings};
