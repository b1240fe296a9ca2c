//! The file store adapter (C4): shared-root file IO, archive expansion,
//! and the SQL-file validity heuristic.

pub mod encoding;
pub mod paths;
pub mod store;
pub mod validate;

pub use store::{FileStore, LocalFileStore};
