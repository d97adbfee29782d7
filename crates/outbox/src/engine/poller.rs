//! Poller engine for one task type
//!
//! Owns submission, partition assignment, the scheduled poll loop,
//! concurrent dispatch, retry/failure bookkeeping and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::partition::Partitioner;
use crate::executor::TaskExecutor;
use crate::ids::{sequence_key, IdGenerator, UuidV7Generator};
use crate::persistence::{StoreError, TaskStore};
use crate::reliability::BackoffPolicy;
use crate::task::{Payload, TaskConfig, TaskRecord, TaskResult};

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing or invalid construction-time configuration
    #[error("invalid engine configuration: {0}")]
    Config(String),

    /// Submission to a disabled task type
    #[error("task type is disabled: {0}")]
    Disabled(String),

    /// Caller-assigned task id was empty
    #[error("task id must not be empty")]
    InvalidTaskId,

    /// A generated task id already exists in storage
    #[error("generated task id already exists: {0}")]
    DuplicateTaskId(String),

    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// In-flight tasks did not finish within the shutdown timeout
    #[error("graceful stop timed out with {in_flight} task(s) in flight")]
    ShutdownTimeout { in_flight: usize },
}

/// What happened to one dispatched record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Already claimed by another worker, nothing done
    Skipped,
    /// Executed successfully
    Succeeded,
    /// Failed, retry scheduled
    RetryScheduled,
    /// Failed terminally
    Failed,
    /// Executed, but the record was reclaimed before the outcome could be
    /// recorded; the outcome was discarded
    ClaimLost,
}

/// State shared between the engine handle, its loops and its workers
struct EngineInner {
    config: TaskConfig,
    store: Arc<dyn TaskStore>,
    executor: Arc<dyn TaskExecutor>,
    ids: Arc<dyn IdGenerator>,
    partitioner: Partitioner,
    backoff: BackoffPolicy,
    tracker: TaskTracker,
    permits: Option<Arc<Semaphore>>,
}

/// Handles of a running engine
struct RunHandle {
    shutdown_tx: watch::Sender<bool>,
    loops: Vec<JoinHandle<()>>,
}

/// Background dispatcher for one task type
///
/// # Example
///
/// ```ignore
/// use courier_outbox::prelude::*;
///
/// let engine = PollerEngine::builder(TaskConfig::new("order_webhook").with_house_number_count(4))
///     .store(store)
///     .executor(Arc::new(WebhookExecutor::new(url)))
///     .build()?;
///
/// engine.start();
/// let task_id = engine.submit("order-42", payload).await?;
///
/// // ... later, graceful stop
/// engine.stop().await?;
/// ```
pub struct PollerEngine {
    inner: Arc<EngineInner>,
    run: Mutex<Option<RunHandle>>,
}

/// Builder for [`PollerEngine`]
pub struct PollerEngineBuilder {
    config: TaskConfig,
    store: Option<Arc<dyn TaskStore>>,
    executor: Option<Arc<dyn TaskExecutor>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl PollerEngineBuilder {
    /// Set the storage backend (required)
    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the executor (required)
    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the id source (defaults to [`UuidV7Generator`])
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Validate and build the engine
    pub fn build(self) -> Result<PollerEngine, EngineError> {
        self.config.validate().map_err(EngineError::Config)?;

        let store = self
            .store
            .ok_or_else(|| EngineError::Config("a task store is required".to_string()))?;
        let executor = self
            .executor
            .ok_or_else(|| EngineError::Config("a task executor is required".to_string()))?;
        let ids = self.ids.unwrap_or_else(|| Arc::new(UuidV7Generator));

        let partitioner = Partitioner::new(
            self.config.partition_strategy,
            self.config.house_numbers.clone(),
        );
        let backoff = self.config.backoff_policy();
        let permits = self
            .config
            .max_concurrency
            .map(|max| Arc::new(Semaphore::new(max)));

        Ok(PollerEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                store,
                executor,
                ids,
                partitioner,
                backoff,
                tracker: TaskTracker::new(),
                permits,
            }),
            run: Mutex::new(None),
        })
    }
}

impl PollerEngine {
    /// Start building an engine for `config`
    pub fn builder(config: TaskConfig) -> PollerEngineBuilder {
        PollerEngineBuilder {
            config,
            store: None,
            executor: None,
            ids: None,
        }
    }

    /// Build an engine with the default id source
    pub fn new(
        config: TaskConfig,
        store: Arc<dyn TaskStore>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<Self, EngineError> {
        Self::builder(config).store(store).executor(executor).build()
    }

    /// Task type served by this engine
    pub fn task_type(&self) -> &str {
        &self.inner.config.task_type
    }

    /// Engine configuration
    pub fn config(&self) -> &TaskConfig {
        &self.inner.config
    }

    /// Whether the poll loop is running
    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    /// Number of dispatched workers that have not finished
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Persist a new task and return its generated id
    ///
    /// Fire-and-forget: nothing is executed here. Fails with
    /// [`EngineError::DuplicateTaskId`] if the id source hands out an id
    /// that is already stored.
    #[instrument(skip(self, payload), fields(task_type = %self.inner.config.task_type))]
    pub async fn submit(&self, business_id: &str, payload: Payload) -> Result<String, EngineError> {
        let id = self.inner.ids.next_id();
        let task_id = id.to_string();
        if !self
            .inner
            .save(&task_id, sequence_key(&id), business_id, payload)
            .await?
        {
            error!(%task_id, "Generated task id collides with a stored record");
            return Err(EngineError::DuplicateTaskId(task_id));
        }
        Ok(task_id)
    }

    /// Persist a task under a caller-assigned id
    ///
    /// Re-submitting an existing id leaves the stored record untouched and
    /// returns the same id.
    #[instrument(skip(self, task_id, payload), fields(task_type = %self.inner.config.task_type))]
    pub async fn submit_with_id(
        &self,
        task_id: impl Into<String>,
        business_id: &str,
        payload: Payload,
    ) -> Result<String, EngineError> {
        let task_id = task_id.into();
        if task_id.trim().is_empty() {
            return Err(EngineError::InvalidTaskId);
        }
        let sequence = sequence_key(&self.inner.ids.next_id());
        if !self
            .inner
            .save(&task_id, sequence, business_id, payload)
            .await?
        {
            debug!(%task_id, "Task already submitted");
        }
        Ok(task_id)
    }

    /// Start the poll loop
    ///
    /// Idempotent. The first poll cycle runs immediately, then every
    /// `poll_interval`. A disabled engine stays stopped. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) {
        let config = &self.inner.config;
        if !config.enabled {
            info!(task_type = %config.task_type, "Task type disabled, engine not started");
            return;
        }

        let mut run = self.run.lock();
        if run.is_some() {
            return;
        }

        info!(
            task_type = %config.task_type,
            house_numbers = ?config.house_numbers,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            fetch_limit = config.fetch_limit,
            "Starting poller engine"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.inner.tracker.reopen();

        let mut loops = vec![tokio::spawn(poll_loop(
            Arc::clone(&self.inner),
            shutdown_rx.clone(),
        ))];
        if let Some(threshold) = config.stale_threshold {
            loops.push(tokio::spawn(reclaim_loop(
                Arc::clone(&self.inner),
                shutdown_rx,
                threshold,
            )));
        }

        *run = Some(RunHandle { shutdown_tx, loops });
    }

    /// Stop polling and wait for in-flight tasks
    ///
    /// Idempotent. In-flight executions are never interrupted; if they do not
    /// finish within `shutdown_timeout` they are abandoned and remain
    /// processing in storage.
    #[instrument(skip(self), fields(task_type = %self.inner.config.task_type))]
    pub async fn stop(&self) -> Result<(), EngineError> {
        let Some(run) = self.run.lock().take() else {
            return Ok(());
        };

        info!("Stopping poller engine");
        let _ = run.shutdown_tx.send(true);

        // No new dispatches once the loops have exited
        for handle in run.loops {
            if let Err(e) = handle.await {
                warn!(error = %e, "Engine loop ended abnormally");
            }
        }

        let tracker = &self.inner.tracker;
        tracker.close();
        match tokio::time::timeout(self.inner.config.shutdown_timeout, tracker.wait()).await {
            Ok(()) => {
                info!("Poller engine stopped");
                Ok(())
            }
            Err(_) => {
                let in_flight = tracker.len();
                warn!(in_flight, "Shutdown timeout reached, abandoning in-flight tasks");
                Err(EngineError::ShutdownTimeout { in_flight })
            }
        }
    }

    /// Run one poll cycle now, independent of the schedule
    ///
    /// Returns the number of records dispatched.
    pub async fn poll_now(&self) -> Result<usize, EngineError> {
        self.inner.poll_once().await
    }

    /// Claim, execute and record the outcome of a single record
    ///
    /// This is what every dispatched worker runs.
    pub async fn process_task(&self, record: TaskRecord) -> Result<TaskOutcome, EngineError> {
        self.inner.process_task(record).await
    }
}

impl Drop for PollerEngine {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            let _ = run.shutdown_tx.send(true);
        }
    }
}

impl std::fmt::Debug for PollerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerEngine")
            .field("task_type", &self.inner.config.task_type)
            .field("running", &self.is_running())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl EngineInner {
    /// Returns whether a new record was stored
    async fn save(
        &self,
        task_id: &str,
        sequence: u64,
        business_id: &str,
        payload: Payload,
    ) -> Result<bool, EngineError> {
        if !self.config.enabled {
            return Err(EngineError::Disabled(self.config.task_type.clone()));
        }

        let house_number = self.partitioner.assign(sequence, business_id);
        let mut record = TaskRecord::new(
            task_id,
            self.config.task_type.clone(),
            business_id,
            payload,
        );
        record.house_number = house_number;

        let inserted = self.store.save(&record, house_number).await?;
        if inserted {
            debug!(%task_id, business_id, house_number, "Task submitted");
        }
        Ok(inserted)
    }

    /// Fetch due records and hand each to its own worker
    async fn poll_once(self: &Arc<Self>) -> Result<usize, EngineError> {
        let mut limit = self.config.fetch_limit;
        if let Some(permits) = &self.permits {
            limit = limit.min(permits.available_permits());
            if limit == 0 {
                debug!("All workers busy, skipping fetch");
                return Ok(0);
            }
        }

        let records = self
            .store
            .fetch_pending(
                &self.config.task_type,
                self.partitioner.house_numbers(),
                None,
                limit,
            )
            .await?;

        let mut dispatched = 0;
        for record in records {
            let permit = match &self.permits {
                Some(permits) => match Arc::clone(permits).try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        debug!("No permits available");
                        break;
                    }
                },
                None => None,
            };
            self.dispatch(record, permit);
            dispatched += 1;
        }

        if dispatched > 0 {
            debug!(count = dispatched, "Dispatched tasks");
        }
        Ok(dispatched)
    }

    fn dispatch(self: &Arc<Self>, record: TaskRecord, permit: Option<OwnedSemaphorePermit>) {
        let inner = Arc::clone(self);
        self.tracker.spawn(async move {
            let task_id = record.id.clone();
            let retry_count = record.retry_count;
            if let Err(e) = inner.process_task(record).await {
                error!(
                    %task_id,
                    task_type = %inner.config.task_type,
                    retry_count,
                    error = %e,
                    "Task processing failed, record may stay processing until reclaimed"
                );
            }
            drop(permit);
        });
    }

    async fn process_task(&self, record: TaskRecord) -> Result<TaskOutcome, EngineError> {
        let claim_id = Uuid::now_v7().to_string();
        if !self
            .store
            .update_to_processing(&record.id, &claim_id)
            .await?
        {
            debug!(task_id = %record.id, "Task already claimed, skipping");
            return Ok(TaskOutcome::Skipped);
        }

        let result = self.execute(&record).await;

        if result.success {
            if !self.store.update_to_success(&record.id, &claim_id).await? {
                return Ok(self.claim_lost(&record, &claim_id));
            }
            debug!(task_id = %record.id, "Task succeeded");
            return Ok(TaskOutcome::Succeeded);
        }

        let new_retry_count = record.retry_count + 1;
        let error_message = result.error_message.as_deref();

        if !result.retryable || new_retry_count >= self.config.max_retry {
            if !self
                .store
                .update_to_failed(&record.id, &claim_id, error_message, None)
                .await?
            {
                return Ok(self.claim_lost(&record, &claim_id));
            }
            error!(
                task_id = %record.id,
                task_type = %self.config.task_type,
                retry_count = new_retry_count,
                retryable = result.retryable,
                error = error_message.unwrap_or_default(),
                "Task failed permanently"
            );
            return Ok(TaskOutcome::Failed);
        }

        let delay = self.backoff.delay_for_attempt(new_retry_count);
        let next_retry_time = retry_time(delay);
        if !self
            .store
            .update_to_failed(&record.id, &claim_id, error_message, Some(next_retry_time))
            .await?
        {
            return Ok(self.claim_lost(&record, &claim_id));
        }
        warn!(
            task_id = %record.id,
            task_type = %self.config.task_type,
            retry_count = new_retry_count,
            delay_ms = delay.as_millis() as u64,
            error = error_message.unwrap_or_default(),
            "Task failed, retry scheduled"
        );
        Ok(TaskOutcome::RetryScheduled)
    }

    fn claim_lost(&self, record: &TaskRecord, claim_id: &str) -> TaskOutcome {
        warn!(
            task_id = %record.id,
            task_type = %self.config.task_type,
            claim_id,
            "Claim lost before the outcome was recorded, outcome discarded"
        );
        TaskOutcome::ClaimLost
    }

    /// Run the executor in its own task so a panic becomes a retryable failure
    async fn execute(&self, record: &TaskRecord) -> TaskResult {
        let executor = Arc::clone(&self.executor);
        let owned = record.clone();

        match tokio::spawn(async move { executor.execute(&owned).await }).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    task_id = %record.id,
                    task_type = %record.task_type,
                    retry_count = record.retry_count,
                    error = %e,
                    "Executor panicked"
                );
                TaskResult::retryable(format!("executor panicked: {e}"))
            }
        }
    }
}

fn retry_time(delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| Utc::now().checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

async fn poll_loop(inner: Arc<EngineInner>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = inner.poll_once().await {
                    error!(task_type = %inner.config.task_type, error = %e, "Poll cycle failed");
                }
            }
            _ = shutdown_rx.changed() => {
                debug!("Poll loop: shutdown requested");
                break;
            }
        }
    }

    debug!("Poll loop exited");
}

async fn reclaim_loop(
    inner: Arc<EngineInner>,
    mut shutdown_rx: watch::Receiver<bool>,
    threshold: Duration,
) {
    let mut ticker = tokio::time::interval(inner.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match inner
                    .store
                    .reclaim_stale(&inner.config.task_type, inner.partitioner.house_numbers(), threshold)
                    .await
                {
                    Ok(reclaimed) => {
                        if !reclaimed.is_empty() {
                            warn!(count = reclaimed.len(), "Reclaimed stale processing tasks");
                        }
                    }
                    Err(e) => {
                        error!(task_type = %inner.config.task_type, error = %e, "Stale task reclamation failed");
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                debug!("Reclaim loop: shutdown requested");
                break;
            }
        }
    }

    debug!("Reclaim loop exited");
}
