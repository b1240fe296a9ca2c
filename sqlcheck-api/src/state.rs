//! Shared application state, in the shape of `agent_routes.rs`'s `AgentState`:
//! constructor-injected service handles the HTTP dispatcher holds by value,
//! cheap to clone because every field is an `Arc`/already-`Clone` facade
//! (§9 redesign note: decorator/DI framework -> constructor injection).

use sqlcheck_core::{JobService, TaskService};

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobService,
    pub tasks: TaskService,
}

impl AppState {
    pub fn new(jobs: JobService, tasks: TaskService) -> Self {
        Self { jobs, tasks }
    }
}
