//! Development executor that only logs

use async_trait::async_trait;
use courier_outbox::{TaskExecutor, TaskRecord, TaskResult};
use tracing::info;

/// Logs every record and reports success
#[derive(Debug, Clone, Default)]
pub struct LogExecutor;

#[async_trait]
impl TaskExecutor for LogExecutor {
    async fn execute(&self, record: &TaskRecord) -> TaskResult {
        info!(
            task_id = %record.id,
            task_type = %record.task_type,
            business_id = %record.business_id,
            retry_count = record.retry_count,
            payload = %serde_json::Value::Object(record.payload.clone()),
            "Executing task"
        );
        TaskResult::ok()
    }
}

#[cfg(test)]
mod tests {
    use courier_outbox::Payload;

    use super::*;

    #[tokio::test]
    async fn test_log_executor_succeeds() {
        let record = TaskRecord::new("1", "audit", "user-1", Payload::new());
        let result = LogExecutor.execute(&record).await;
        assert!(result.success);
        assert!(result.data.is_none());
    }
}
