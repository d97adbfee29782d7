//! Courier worker
//!
//! Runs one poller engine per configured task type against PostgreSQL (or an
//! in-memory store for local runs), delivering records through webhooks.

pub mod app;
pub mod config;
pub mod executors;
pub mod telemetry;

pub use app::{build_executor, build_registry, connect_store};
pub use config::{ConfigError, ExecutorKind, TaskTypeConfig, WorkerConfig};
pub use executors::{LogExecutor, WebhookExecutor};
