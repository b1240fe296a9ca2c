//! The Control API (C11): a thin HTTP surface over `JobService`/`TaskService`
//! (§6.1). Framing, auth, health, and metrics are out of scope (§1) and left
//! to whatever reverse proxy or sidecar fronts this router in production.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
