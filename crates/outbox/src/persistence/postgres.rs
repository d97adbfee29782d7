//! PostgreSQL implementation of TaskStore
//!
//! Production persistence using PostgreSQL with:
//! - Claim as a single conditional `UPDATE` keyed on the current status
//! - Outcome writes fenced on `status = 'processing'` and the claim id
//! - Idempotent inserts (`ON CONFLICT DO NOTHING`) for caller-assigned ids
//! - Keyset pagination over `(due_at, id)`

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};

use super::store::*;
use crate::task::{Payload, TaskRecord, TaskStatus};

const CLAIMABLE: &str = "(status = 'pending' OR (status = 'failed' AND next_retry_time IS NOT NULL AND next_retry_time <= NOW()))";

/// PostgreSQL implementation of TaskStore
///
/// # Example
///
/// ```ignore
/// use courier_outbox::PostgresTaskStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/courier").await?;
/// let store = PostgresTaskStore::new(pool);
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresTaskStore {
    pool: PgPool,
}

impl PostgresTaskStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                StoreError::Database(e.to_string())
            })
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    #[instrument(skip(self, record), fields(task_id = %record.id, task_type = %record.task_type))]
    async fn save(&self, record: &TaskRecord, house_number: i32) -> Result<bool, StoreError> {
        let payload = serde_json::Value::Object(record.payload.clone());

        let result = sqlx::query(
            r#"
            INSERT INTO courier_tasks (id, task_type, business_id, house_number, payload, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(&record.task_type)
        .bind(&record.business_id)
        .bind(house_number)
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save task: {}", e);
            StoreError::Database(e.to_string())
        })?;

        let inserted = result.rows_affected() == 1;
        if !inserted {
            debug!("task already exists, save ignored");
        }
        Ok(inserted)
    }

    #[instrument(skip(self, cursor))]
    async fn fetch_pending(
        &self,
        task_type: &str,
        house_numbers: &[i32],
        cursor: Option<&FetchCursor>,
        limit: usize,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        if house_numbers.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let query = format!(
            r#"
            SELECT id, task_type, business_id, house_number, payload, status, retry_count,
                   error_message, next_retry_time, claim_id, created_at, updated_at
            FROM courier_tasks
            WHERE task_type = $1
              AND house_number = ANY($2)
              AND {CLAIMABLE}
              AND ($3::timestamptz IS NULL
                   OR (COALESCE(next_retry_time, created_at), id) > ($3::timestamptz, $4::text))
            ORDER BY COALESCE(next_retry_time, created_at), id
            LIMIT $5
            "#
        );

        let rows = sqlx::query(&query)
            .bind(task_type)
            .bind(house_numbers)
            .bind(cursor.map(|c| c.due_at))
            .bind(cursor.map(|c| c.id.as_str()))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch pending tasks: {}", e);
                StoreError::Database(e.to_string())
            })?;

        rows.iter().map(row_to_record).collect()
    }

    #[instrument(skip(self))]
    async fn update_to_processing(&self, id: &str, claim_id: &str) -> Result<bool, StoreError> {
        let query = format!(
            r#"
            UPDATE courier_tasks
            SET status = 'processing', claim_id = $2, updated_at = NOW()
            WHERE id = $1 AND {CLAIMABLE}
            "#
        );

        let result = sqlx::query(&query)
            .bind(id)
            .bind(claim_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to claim task: {}", e);
                StoreError::Database(e.to_string())
            })?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn update_to_success(&self, id: &str, claim_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE courier_tasks
            SET status = 'success', claim_id = NULL, next_retry_time = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'processing' AND claim_id = $2
            "#,
        )
        .bind(id)
        .bind(claim_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to complete task: {}", e);
            StoreError::Database(e.to_string())
        })?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, error_message))]
    async fn update_to_failed(
        &self,
        id: &str,
        claim_id: &str,
        error_message: Option<&str>,
        next_retry_time: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE courier_tasks
            SET status = 'failed',
                claim_id = NULL,
                retry_count = retry_count + 1,
                error_message = $3,
                next_retry_time = $4,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing' AND claim_id = $2
            "#,
        )
        .bind(id)
        .bind(claim_id)
        .bind(error_message)
        .bind(next_retry_time)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fail task: {}", e);
            StoreError::Database(e.to_string())
        })?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, task_type, business_id, house_number, payload, status, retry_count,
                   error_message, next_retry_time, claim_id, created_at, updated_at
            FROM courier_tasks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get task: {}", e);
            StoreError::Database(e.to_string())
        })?;

        row.as_ref().map(row_to_record).transpose()
    }

    #[instrument(skip(self))]
    async fn reclaim_stale(
        &self,
        task_type: &str,
        house_numbers: &[i32],
        older_than: Duration,
    ) -> Result<Vec<String>, StoreError> {
        // Beyond chrono's range no claim can be that old
        if stale_cutoff(Utc::now(), older_than).is_none() {
            return Ok(vec![]);
        }

        let rows = sqlx::query(
            r#"
            UPDATE courier_tasks
            SET status = 'pending', claim_id = NULL, updated_at = NOW()
            WHERE task_type = $1
              AND house_number = ANY($2)
              AND status = 'processing'
              AND updated_at <= NOW() - make_interval(secs => $3)
            RETURNING id
            "#,
        )
        .bind(task_type)
        .bind(house_numbers)
        .bind(older_than.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to reclaim stale tasks: {}", e);
            StoreError::Database(e.to_string())
        })?;

        let reclaimed: Vec<String> = rows.iter().map(|row| row.get("id")).collect();
        if !reclaimed.is_empty() {
            debug!(task_type, count = reclaimed.len(), "reclaimed stale tasks");
        }
        Ok(reclaimed)
    }
}

fn row_to_record(row: &PgRow) -> Result<TaskRecord, StoreError> {
    let status: String = row.get("status");
    let status = status
        .parse::<TaskStatus>()
        .map_err(StoreError::Serialization)?;

    let payload = match row.get::<serde_json::Value, _>("payload") {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => Payload::new(),
        other => {
            return Err(StoreError::Serialization(format!(
                "payload must be a JSON object, got {other}"
            )))
        }
    };

    Ok(TaskRecord {
        id: row.get("id"),
        task_type: row.get("task_type"),
        business_id: row.get("business_id"),
        payload,
        retry_count: row.get::<i32, _>("retry_count").max(0) as u32,
        error_message: row.get("error_message"),
        house_number: row.get("house_number"),
        status,
        next_retry_time: row.get("next_retry_time"),
        claim_id: row.get("claim_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
