//! Persistence layer for outbox tasks
//!
//! This module provides:
//! - [`TaskStore`] trait for task persistence and state transitions
//! - [`InMemoryTaskStore`] for testing and local runs
//! - [`PostgresTaskStore`] for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryTaskStore;
pub use postgres::PostgresTaskStore;
pub use store::{stale_cutoff, FetchCursor, StoreError, TaskStore};
