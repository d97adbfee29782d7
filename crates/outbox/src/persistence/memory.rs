//! In-memory implementation of TaskStore for testing

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::store::*;
use crate::task::{TaskRecord, TaskStatus};

/// In-memory implementation of TaskStore
///
/// Every state transition happens under one write lock, which gives the
/// claim the same compare-and-set semantics as the PostgreSQL
/// implementation.
///
/// # Example
///
/// ```
/// use courier_outbox::InMemoryTaskStore;
///
/// let store = InMemoryTaskStore::new();
/// assert_eq!(store.len(), 0);
/// ```
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, TaskRecord>>,
}

impl InMemoryTaskStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of stored records
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Get the number of records in `status`
    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks
            .read()
            .values()
            .filter(|t| t.status == status)
            .count()
    }

    /// Snapshot of all stored records
    pub fn records(&self) -> Vec<TaskRecord> {
        self.tasks.read().values().cloned().collect()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.tasks.write().clear();
    }

    /// Apply an outcome to a record still processing under `claim_id`
    fn finish<F>(&self, id: &str, claim_id: &str, apply: F) -> bool
    where
        F: FnOnce(&mut TaskRecord),
    {
        let mut tasks = self.tasks.write();
        match tasks.get_mut(id) {
            Some(task)
                if task.status == TaskStatus::Processing
                    && task.claim_id.as_deref() == Some(claim_id) =>
            {
                apply(task);
                task.claim_id = None;
                task.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, record: &TaskRecord, house_number: i32) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&record.id) {
            return Ok(false);
        }

        let now = Utc::now();
        let mut record = record.clone();
        record.house_number = house_number;
        record.status = TaskStatus::Pending;
        record.next_retry_time = None;
        record.claim_id = None;
        record.created_at = now;
        record.updated_at = now;
        tasks.insert(record.id.clone(), record);
        Ok(true)
    }

    async fn fetch_pending(
        &self,
        task_type: &str,
        house_numbers: &[i32],
        cursor: Option<&FetchCursor>,
        limit: usize,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let now = Utc::now();
        let tasks = self.tasks.read();

        let mut due: Vec<&TaskRecord> = tasks
            .values()
            .filter(|t| t.task_type == task_type)
            .filter(|t| house_numbers.contains(&t.house_number))
            .filter(|t| t.is_claimable(now))
            .filter(|t| cursor.map_or(true, |c| c.precedes(t)))
            .collect();

        due.sort_by(|a, b| (a.due_at(), &a.id).cmp(&(b.due_at(), &b.id)));

        Ok(due.into_iter().take(limit).cloned().collect())
    }

    async fn update_to_processing(&self, id: &str, claim_id: &str) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write();
        let now = Utc::now();

        match tasks.get_mut(id) {
            Some(task) if task.is_claimable(now) => {
                task.status = TaskStatus::Processing;
                task.claim_id = Some(claim_id.to_string());
                task.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_to_success(&self, id: &str, claim_id: &str) -> Result<bool, StoreError> {
        Ok(self.finish(id, claim_id, |task| {
            task.status = TaskStatus::Success;
            task.next_retry_time = None;
        }))
    }

    async fn update_to_failed(
        &self,
        id: &str,
        claim_id: &str,
        error_message: Option<&str>,
        next_retry_time: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        Ok(self.finish(id, claim_id, |task| {
            task.status = TaskStatus::Failed;
            task.retry_count += 1;
            task.error_message = error_message.map(str::to_string);
            task.next_retry_time = next_retry_time;
        }))
    }

    async fn get(&self, id: &str) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.tasks.read().get(id).cloned())
    }

    async fn reclaim_stale(
        &self,
        task_type: &str,
        house_numbers: &[i32],
        older_than: Duration,
    ) -> Result<Vec<String>, StoreError> {
        let now = Utc::now();
        let Some(cutoff) = stale_cutoff(now, older_than) else {
            return Ok(vec![]);
        };

        let mut tasks = self.tasks.write();
        let mut reclaimed = Vec::new();
        for task in tasks.values_mut() {
            if task.task_type == task_type
                && house_numbers.contains(&task.house_number)
                && task.status == TaskStatus::Processing
                && task.updated_at <= cutoff
            {
                task.status = TaskStatus::Pending;
                task.claim_id = None;
                task.updated_at = now;
                reclaimed.push(task.id.clone());
            }
        }
        Ok(reclaimed)
    }
}
