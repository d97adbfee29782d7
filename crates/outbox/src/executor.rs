//! Task executor port
//!
//! The business action performed for each claimed record (HTTP delivery,
//! message-broker publish, ...). Expected failures are returned as
//! [`TaskResult`] values; a panic inside an executor is caught by the engine
//! and treated as a retryable failure.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::task::{TaskRecord, TaskResult};

/// Pluggable action executed once per claimed record
///
/// # Example
///
/// ```ignore
/// use courier_outbox::prelude::*;
///
/// struct PublishExecutor { producer: Producer }
///
/// #[async_trait]
/// impl TaskExecutor for PublishExecutor {
///     async fn execute(&self, record: &TaskRecord) -> TaskResult {
///         match self.producer.send(&record.payload).await {
///             Ok(_) => TaskResult::ok(),
///             Err(e) if e.is_transient() => TaskResult::retryable(e.to_string()),
///             Err(e) => TaskResult::non_retryable(e.to_string()),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Execute the task
    async fn execute(&self, record: &TaskRecord) -> TaskResult;
}

type BoxedHandler =
    Arc<dyn Fn(TaskRecord) -> Pin<Box<dyn Future<Output = TaskResult> + Send>> + Send + Sync>;

/// Executor backed by an async closure
pub struct FnExecutor {
    handler: BoxedHandler,
}

impl FnExecutor {
    /// Wrap an async closure as an executor
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(TaskRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |record| Box::pin(handler(record))),
        }
    }
}

impl std::fmt::Debug for FnExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExecutor").finish_non_exhaustive()
    }
}

#[async_trait]
impl TaskExecutor for FnExecutor {
    async fn execute(&self, record: &TaskRecord) -> TaskResult {
        (self.handler)(record.clone()).await
    }
}

/// Shorthand for [`FnExecutor::new`]
pub fn executor_fn<F, Fut>(handler: F) -> FnExecutor
where
    F: Fn(TaskRecord) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    FnExecutor::new(handler)
}
