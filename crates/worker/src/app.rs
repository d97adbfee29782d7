//! Composition root: store, executors and engines from configuration

use std::sync::Arc;

use anyhow::{Context, Result};
use courier_outbox::{
    EngineRegistry, InMemoryTaskStore, PollerEngine, PostgresTaskStore, TaskExecutor, TaskStore,
};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::config::{ExecutorKind, WorkerConfig};
use crate::executors::{LogExecutor, WebhookExecutor};

/// Connect to PostgreSQL and apply migrations, or fall back to memory
pub async fn connect_store(config: &WorkerConfig) -> Result<Arc<dyn TaskStore>> {
    let Some(database_url) = &config.database_url else {
        warn!("DATABASE_URL not set, using in-memory task store (tasks are lost on exit)");
        return Ok(Arc::new(InMemoryTaskStore::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let store = PostgresTaskStore::new(pool);
    store
        .migrate()
        .await
        .context("Failed to run database migrations")?;
    info!(max_connections = config.max_connections, "Connected to PostgreSQL");

    Ok(Arc::new(store))
}

/// Executor for one configured task type
pub fn build_executor(kind: &ExecutorKind) -> Arc<dyn TaskExecutor> {
    match kind {
        ExecutorKind::Webhook {
            url,
            secret,
            timeout,
        } => {
            let mut executor = WebhookExecutor::new(url.clone()).with_timeout(*timeout);
            if let Some(secret) = secret {
                executor = executor.with_signing_secret(secret.clone());
            }
            Arc::new(executor)
        }
        ExecutorKind::Log => Arc::new(LogExecutor),
    }
}

/// Build, register and start one engine per configured task type
pub fn build_registry(config: &WorkerConfig, store: Arc<dyn TaskStore>) -> Result<EngineRegistry> {
    let registry = EngineRegistry::new();

    for task_type in &config.task_types {
        let engine = PollerEngine::new(
            task_type.task.clone(),
            Arc::clone(&store),
            build_executor(&task_type.executor),
        )
        .with_context(|| format!("Failed to build engine for {}", task_type.task.task_type))?;

        registry
            .register(engine)
            .with_context(|| format!("Failed to register {}", task_type.task.task_type))?;
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use courier_outbox::{Payload, TaskConfig, TaskStatus};

    use super::*;
    use crate::config::TaskTypeConfig;

    fn worker_config(task_types: Vec<TaskTypeConfig>) -> WorkerConfig {
        WorkerConfig {
            database_url: None,
            max_connections: 10,
            shutdown_timeout: Duration::from_secs(1),
            task_types,
        }
    }

    fn log_task(name: &str) -> TaskTypeConfig {
        TaskTypeConfig {
            task: TaskConfig::new(name).with_poll_interval(Duration::from_millis(10)),
            executor: ExecutorKind::Log,
        }
    }

    #[tokio::test]
    async fn test_in_memory_store_without_database_url() {
        let store = connect_store(&worker_config(vec![])).await.unwrap();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_build_registry_starts_engines() {
        let config = worker_config(vec![log_task("audit"), log_task("email")]);
        let store = Arc::new(InMemoryTaskStore::new());
        let registry = build_registry(&config, store.clone()).unwrap();

        assert_eq!(registry.task_types(), vec!["audit", "email"]);
        assert!(registry.get("audit").unwrap().is_running());

        let id = registry.submit("audit", "user-1", Payload::new()).await.unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.get(&id).await.unwrap().unwrap().status != TaskStatus::Success {
            assert!(tokio::time::Instant::now() < deadline, "task never delivered");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        registry.stop_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_task_types_rejected() {
        let config = worker_config(vec![log_task("audit"), log_task("audit")]);
        let result = build_registry(&config, Arc::new(InMemoryTaskStore::new()));
        assert!(result.is_err());
    }
}
