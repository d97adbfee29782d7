//! Task data model
//!
//! This module provides:
//! - [`TaskConfig`] - Immutable per-task-type configuration
//! - [`TaskRecord`] - A persisted unit of pending work
//! - [`TaskResult`] - Outcome of one execution attempt

mod config;
mod record;

pub use config::{PartitionStrategy, TaskConfig};
pub use record::{Payload, TaskRecord, TaskResult, TaskStatus};
