//! Per-task-type engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reliability::{BackoffPolicy, BackoffStrategy, DEFAULT_MULTIPLIER};

/// How a submission is mapped onto a house number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Spread by a globally increasing sequence value (uniform load, no key affinity)
    #[default]
    Sequence,

    /// Hash the business id (same business id always lands on the same house number)
    BusinessKey,
}

impl std::str::FromStr for PartitionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequence" => Ok(Self::Sequence),
            "business_key" => Ok(Self::BusinessKey),
            other => Err(format!("unknown partition strategy: {other}")),
        }
    }
}

/// Configuration for one task type
///
/// Immutable once handed to an engine.
///
/// # Example
///
/// ```
/// use courier_outbox::{BackoffStrategy, TaskConfig};
/// use std::time::Duration;
///
/// let config = TaskConfig::new("order_webhook")
///     .with_house_numbers(vec![0, 1, 2, 3])
///     .with_poll_interval(Duration::from_secs(5))
///     .with_max_retry(5)
///     .with_backoff_strategy(BackoffStrategy::Exponential);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub task_type: String,

    pub enabled: bool,

    /// Partition set served by this engine instance
    pub house_numbers: Vec<i32>,

    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Maximum records fetched per poll cycle
    pub fetch_limit: usize,

    /// Maximum number of attempts before a record is terminally failed
    pub max_retry: u32,

    #[serde(with = "duration_millis")]
    pub base_delay: Duration,

    #[serde(with = "duration_millis")]
    pub max_delay: Duration,

    pub backoff_strategy: BackoffStrategy,

    /// Growth factor for exponential backoff
    pub backoff_multiplier: f64,

    #[serde(default)]
    pub partition_strategy: PartitionStrategy,

    /// Cap on concurrently executing tasks (`None` = one worker per record)
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// Reset records stuck in processing for longer than this (`None` = disabled)
    #[serde(default, with = "option_duration_millis")]
    pub stale_threshold: Option<Duration>,

    /// How long `stop()` waits for in-flight tasks
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            task_type: String::new(),
            enabled: true,
            house_numbers: vec![0],
            poll_interval: Duration::from_secs(10),
            fetch_limit: 100,
            max_retry: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            backoff_strategy: BackoffStrategy::Linear,
            backoff_multiplier: DEFAULT_MULTIPLIER,
            partition_strategy: PartitionStrategy::Sequence,
            max_concurrency: None,
            stale_threshold: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl TaskConfig {
    /// Create a configuration with defaults for the given task type
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            ..Default::default()
        }
    }

    /// Enable or disable the task type
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the partition set
    pub fn with_house_numbers(mut self, house_numbers: Vec<i32>) -> Self {
        self.house_numbers = house_numbers;
        self
    }

    /// Use house numbers `0..count`
    pub fn with_house_number_count(mut self, count: usize) -> Self {
        self.house_numbers = (0..count as i32).collect();
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the maximum records fetched per poll
    pub fn with_fetch_limit(mut self, limit: usize) -> Self {
        self.fetch_limit = limit;
        self
    }

    /// Set the maximum number of attempts
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    /// Set the base retry delay
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the retry delay cap
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff strategy
    pub fn with_backoff_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Set the exponential backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the partition strategy
    pub fn with_partition_strategy(mut self, strategy: PartitionStrategy) -> Self {
        self.partition_strategy = strategy;
        self
    }

    /// Bound the number of concurrently executing tasks
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    /// Enable the stale processing reaper
    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = Some(threshold);
        self
    }

    /// Set the graceful stop timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Backoff policy derived from this configuration
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.backoff_strategy)
            .with_base_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_multiplier(self.backoff_multiplier)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.task_type.trim().is_empty() {
            return Err("task_type must not be empty".to_string());
        }
        if self.house_numbers.is_empty() {
            return Err("house_numbers must not be empty".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be greater than zero".to_string());
        }
        if self.fetch_limit == 0 {
            return Err("fetch_limit must be greater than zero".to_string());
        }
        if self.max_retry == 0 {
            return Err("max_retry must be greater than zero".to_string());
        }
        if self.base_delay > self.max_delay {
            return Err("base_delay must not exceed max_delay".to_string());
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be at least 1.0".to_string());
        }
        if self.max_concurrency == Some(0) {
            return Err("max_concurrency must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde support for Option<Duration> as milliseconds
mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
