//! Engine registry
//!
//! Routes submissions to the engine registered for a task type and drives
//! bulk lifecycle. Owned by the application's composition root and shared by
//! reference (or `Arc`) with producers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{info, instrument};

use super::poller::{EngineError, PollerEngine};
use crate::task::Payload;

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No engine registered for the task type
    #[error("no engine registered for task type: {0}")]
    UnknownTaskType(String),

    /// An engine is already registered for the task type
    #[error("engine already registered for task type: {0}")]
    DuplicateTaskType(String),

    /// Error from the routed engine
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// One engine per task type
#[derive(Default)]
pub struct EngineRegistry {
    engines: RwLock<HashMap<String, Arc<PollerEngine>>>,
}

impl EngineRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine and start it
    pub fn register(&self, engine: PollerEngine) -> Result<Arc<PollerEngine>, RegistryError> {
        let task_type = engine.task_type().to_string();
        let engine = Arc::new(engine);

        {
            let mut engines = self.engines.write();
            if engines.contains_key(&task_type) {
                return Err(RegistryError::DuplicateTaskType(task_type));
            }
            engines.insert(task_type.clone(), Arc::clone(&engine));
        }

        engine.start();
        info!(%task_type, "Registered poller engine");
        Ok(engine)
    }

    /// Engine for a task type
    pub fn get(&self, task_type: &str) -> Option<Arc<PollerEngine>> {
        self.engines.read().get(task_type).cloned()
    }

    fn route(&self, task_type: &str) -> Result<Arc<PollerEngine>, RegistryError> {
        self.get(task_type)
            .ok_or_else(|| RegistryError::UnknownTaskType(task_type.to_string()))
    }

    /// Submit a task to the engine for `task_type`
    #[instrument(skip(self, payload))]
    pub async fn submit(
        &self,
        task_type: &str,
        business_id: &str,
        payload: Payload,
    ) -> Result<String, RegistryError> {
        let engine = self.route(task_type)?;
        Ok(engine.submit(business_id, payload).await?)
    }

    /// Submit a task under a caller-assigned id
    #[instrument(skip(self, payload))]
    pub async fn submit_with_id(
        &self,
        task_type: &str,
        task_id: &str,
        business_id: &str,
        payload: Payload,
    ) -> Result<String, RegistryError> {
        let engine = self.route(task_type)?;
        Ok(engine.submit_with_id(task_id, business_id, payload).await?)
    }

    /// Start every registered engine
    pub fn start_all(&self) {
        for engine in self.engines.read().values() {
            engine.start();
        }
    }

    /// Stop every registered engine concurrently
    ///
    /// All engines are stopped even if some fail; the first error is returned.
    pub async fn stop_all(&self) -> Result<(), RegistryError> {
        let engines: Vec<Arc<PollerEngine>> = self.engines.read().values().cloned().collect();
        info!(count = engines.len(), "Stopping all poller engines");

        let results = join_all(engines.iter().map(|engine| engine.stop())).await;
        results
            .into_iter()
            .find_map(Result::err)
            .map_or(Ok(()), |e| Err(e.into()))
    }

    /// Registered task types
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.engines.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of registered engines
    pub fn len(&self) -> usize {
        self.engines.read().len()
    }

    /// Check if no engine is registered
    pub fn is_empty(&self) -> bool {
        self.engines.read().is_empty()
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}
