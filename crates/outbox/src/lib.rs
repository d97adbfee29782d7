//! # Courier Outbox
//!
//! Transactional outbox poller: business transactions record side effects
//! as task rows, and a background engine delivers them with at-least-once
//! semantics.
//!
//! ## Features
//!
//! - **Partitioned polling**: each engine serves a set of "house numbers" so
//!   several processes can split one task type
//! - **Atomic claim**: a storage-level compare-and-set guarantees a record is
//!   executed by at most one worker at a time, and each outcome is written
//!   only while the worker's claim token still holds the record
//! - **Retries with backoff**: fixed, linear or exponential delays with a cap
//!   and a per-type retry limit
//! - **Pluggable storage**: in-memory for tests, PostgreSQL for production
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      EngineRegistry                          │
//! │  (routes submit(task_type, ...) to one engine per type)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       PollerEngine                           │
//! │  (partition, poll loop, claim, execute, retry/fail)         │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                               │
//!                 ▼                               ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │        TaskStore          │   │       TaskExecutor        │
//! │  (courier_tasks table)    │   │  (webhook, publish, ...)  │
//! └───────────────────────────┘   └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use courier_outbox::prelude::*;
//!
//! let store = Arc::new(PostgresTaskStore::new(pool));
//! let registry = EngineRegistry::new();
//!
//! registry.register(PollerEngine::new(
//!     TaskConfig::new("order_webhook")
//!         .with_house_number_count(4)
//!         .with_backoff_strategy(BackoffStrategy::Exponential),
//!     store,
//!     Arc::new(executor_fn(|record| async move { deliver(record).await })),
//! )?)?;
//!
//! // Inside the business transaction's success path
//! let task_id = registry.submit("order_webhook", "order-42", payload).await?;
//!
//! // On shutdown
//! registry.stop_all().await?;
//! ```

pub mod engine;
pub mod executor;
pub mod ids;
pub mod persistence;
pub mod reliability;
pub mod task;

/// Prelude for common imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use async_trait::async_trait;

    pub use crate::engine::{
        EngineError, EngineRegistry, PollerEngine, PollerEngineBuilder, RegistryError,
        TaskOutcome,
    };
    pub use crate::executor::{executor_fn, FnExecutor, TaskExecutor};
    pub use crate::ids::{IdGenerator, SequenceIdGenerator, UuidV7Generator};
    pub use crate::persistence::{
        FetchCursor, InMemoryTaskStore, PostgresTaskStore, StoreError, TaskStore,
    };
    pub use crate::reliability::{BackoffPolicy, BackoffStrategy};
    pub use crate::task::{
        PartitionStrategy, Payload, TaskConfig, TaskRecord, TaskResult, TaskStatus,
    };
}

// Re-export key types at crate root
pub use engine::{EngineError, EngineRegistry, PollerEngine, RegistryError, TaskOutcome};
pub use executor::{executor_fn, FnExecutor, TaskExecutor};
pub use ids::{IdGenerator, SequenceIdGenerator, UuidV7Generator};
pub use persistence::{FetchCursor, InMemoryTaskStore, PostgresTaskStore, StoreError, TaskStore};
pub use reliability::{BackoffPolicy, BackoffStrategy};
pub use task::{PartitionStrategy, Payload, TaskConfig, TaskRecord, TaskResult, TaskStatus};
