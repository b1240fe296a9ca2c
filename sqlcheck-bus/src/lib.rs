//! The bus (C7): publish/subscribe channels for request and result events.

pub mod bus;
pub mod memory_bus;

#[cfg(feature = "postgres")]
pub mod postgres_bus;

pub use bus::Bus;
pub use memory_bus::InMemoryBus;

#[cfg(feature = "postgres")]
pub use postgres_bus::PostgresBus;
