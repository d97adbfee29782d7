//! Task record and execution outcome types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque business data carried by a task
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Persisted task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted and waiting for its first attempt
    Pending,

    /// Claimed by a worker
    Processing,

    /// Executed successfully (terminal)
    Success,

    /// Last attempt failed; terminal unless `next_retry_time` is set
    Failed,
}

impl TaskStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// One unit of pending work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Globally unique id (caller- or system-assigned)
    pub id: String,

    pub task_type: String,

    /// Business key the task was submitted for
    pub business_id: String,

    pub payload: Payload,

    /// Number of failed attempts so far
    pub retry_count: u32,

    /// Error message of the last failed attempt
    pub error_message: Option<String>,

    /// Partition key, fixed at submission
    pub house_number: i32,

    pub status: TaskStatus,

    /// When a failed record becomes claimable again (`None` = terminal)
    pub next_retry_time: Option<DateTime<Utc>>,

    /// Token of the claim holding the record while processing
    pub claim_id: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Last state transition
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a new pending record
    pub fn new(
        id: impl Into<String>,
        task_type: impl Into<String>,
        business_id: impl Into<String>,
        payload: Payload,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            task_type: task_type.into(),
            business_id: business_id.into(),
            payload,
            retry_count: 0,
            error_message: None,
            house_number: 0,
            status: TaskStatus::Pending,
            next_retry_time: None,
            claim_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the poll loop may claim this record at `now`
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            TaskStatus::Pending => true,
            TaskStatus::Failed => self.next_retry_time.is_some_and(|t| t <= now),
            TaskStatus::Processing | TaskStatus::Success => false,
        }
    }

    /// Whether no further automatic attempt will happen
    pub fn is_terminal(&self) -> bool {
        match self.status {
            TaskStatus::Success => true,
            TaskStatus::Failed => self.next_retry_time.is_none(),
            TaskStatus::Pending | TaskStatus::Processing => false,
        }
    }

    /// Time the record became (or becomes) due, used for fair ordering
    pub fn due_at(&self) -> DateTime<Utc> {
        self.next_retry_time.unwrap_or(self.created_at)
    }
}

/// Outcome of executing one task
///
/// Expected business failures are reported here rather than raised.
/// `retryable` is only meaningful when `success` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub retryable: bool,
}

impl TaskResult {
    /// Successful execution without output
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error_message: None,
            retryable: false,
        }
    }

    /// Successful execution with output
    pub fn ok_with(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok()
        }
    }

    /// Transient failure; the engine schedules a retry while attempts remain
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error_message: Some(message.into()),
            retryable: true,
        }
    }

    /// Permanent failure; the record becomes terminally failed
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            ..Self::retryable(message)
        }
    }
}
