//! TaskStore trait definition

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::task::TaskRecord;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Keyset position within the due-ordered pending records of a task type
///
/// Records are surfaced ordered by `(due_at, id)`; a cursor resumes strictly
/// after the record it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCursor {
    pub due_at: DateTime<Utc>,
    pub id: String,
}

impl FetchCursor {
    /// Cursor positioned after `record`
    pub fn after(record: &TaskRecord) -> Self {
        Self {
            due_at: record.due_at(),
            id: record.id.clone(),
        }
    }

    /// Whether `record` sorts strictly after this cursor
    pub fn precedes(&self, record: &TaskRecord) -> bool {
        (record.due_at(), record.id.as_str()) > (self.due_at, self.id.as_str())
    }
}

/// Cutoff for records stuck in processing for longer than `older_than`
///
/// `None` when the threshold reaches past the earliest representable time,
/// in which case nothing can be stale.
pub fn stale_cutoff(now: DateTime<Utc>, older_than: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(older_than)
        .ok()
        .and_then(|threshold| now.checked_sub_signed(threshold))
}

/// Durable storage of task records and their state transitions
///
/// Implementations must be thread-safe. [`TaskStore::update_to_processing`]
/// is the only concurrency-control primitive the engine relies on and must
/// be a single atomic conditional update, never a read followed by a write.
///
/// A claim stamps the record with a caller-chosen claim id. Outcome writes
/// carry the same id and only apply while the record is still processing
/// under it, so a worker whose record was reclaimed can never overwrite the
/// outcome of the attempt that replaced it.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Persist a new pending record on `house_number`
    ///
    /// Returns `false` and leaves the stored record untouched when the id
    /// already exists.
    async fn save(&self, record: &TaskRecord, house_number: i32) -> Result<bool, StoreError>;

    /// Fetch claimable records of `task_type` on the given house numbers
    ///
    /// Claimable means pending, or failed with a `next_retry_time` that has
    /// passed. Oldest-due first, at most `limit` records. `None` cursor
    /// starts from the beginning.
    async fn fetch_pending(
        &self,
        task_type: &str,
        house_numbers: &[i32],
        cursor: Option<&FetchCursor>,
        limit: usize,
    ) -> Result<Vec<TaskRecord>, StoreError>;

    /// Atomically move a claimable record to processing under `claim_id`
    ///
    /// Returns `false` when the record was claimed by someone else, no
    /// longer qualifies, or does not exist.
    async fn update_to_processing(&self, id: &str, claim_id: &str) -> Result<bool, StoreError>;

    /// Mark a record held by `claim_id` as successfully executed (terminal)
    ///
    /// Returns `false` without changing anything when the record is no
    /// longer processing under `claim_id`.
    async fn update_to_success(&self, id: &str, claim_id: &str) -> Result<bool, StoreError>;

    /// Record a failed attempt of a record held by `claim_id`
    ///
    /// Increments `retry_count` and stores `error_message`. With a
    /// `next_retry_time` the record becomes claimable again once due,
    /// without one it is terminally failed. Returns `false` without
    /// changing anything when the record is no longer processing under
    /// `claim_id`.
    async fn update_to_failed(
        &self,
        id: &str,
        claim_id: &str,
        error_message: Option<&str>,
        next_retry_time: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError>;

    /// Load a record by id
    async fn get(&self, id: &str) -> Result<Option<TaskRecord>, StoreError>;

    /// Reset records stuck in processing for longer than `older_than`
    ///
    /// Returns the ids that were reset to pending. `retry_count` is kept and
    /// the previous claim is released.
    async fn reclaim_stale(
        &self,
        _task_type: &str,
        _house_numbers: &[i32],
        _older_than: Duration,
    ) -> Result<Vec<String>, StoreError> {
        Ok(vec![])
    }
}
