//! Worker configuration from environment variables
//!
//! Global:
//! - `DATABASE_URL`: PostgreSQL connection string (in-memory store when unset)
//! - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
//! - `COURIER_TASK_TYPES`: Comma separated task types to serve (required)
//! - `COURIER_SHUTDOWN_TIMEOUT_MS`: Graceful stop bound per engine (default: 30000)
//!
//! Per task type, with `<TYPE>` the upper-cased task type and every
//! non-alphanumeric character replaced by `_`:
//! - `COURIER_<TYPE>_ENABLED`
//! - `COURIER_<TYPE>_HOUSE_NUMBERS`: Comma separated list, or a count (`4` = `0,1,2,3`)
//! - `COURIER_<TYPE>_POLL_INTERVAL_MS`, `COURIER_<TYPE>_FETCH_LIMIT`
//! - `COURIER_<TYPE>_MAX_RETRY`, `COURIER_<TYPE>_BASE_DELAY_MS`, `COURIER_<TYPE>_MAX_DELAY_MS`
//! - `COURIER_<TYPE>_BACKOFF`: `fixed` | `linear` | `exponential`
//! - `COURIER_<TYPE>_BACKOFF_MULTIPLIER`
//! - `COURIER_<TYPE>_PARTITION`: `sequence` | `business_key`
//! - `COURIER_<TYPE>_MAX_CONCURRENCY`, `COURIER_<TYPE>_STALE_THRESHOLD_MS`
//! - `COURIER_<TYPE>_WEBHOOK_URL`, `COURIER_<TYPE>_WEBHOOK_SECRET`,
//!   `COURIER_<TYPE>_WEBHOOK_TIMEOUT_MS` (log executor when no URL is set)

use std::str::FromStr;
use std::time::Duration;

use courier_outbox::TaskConfig;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set
    #[error("{0} must be set")]
    Missing(String),

    /// A variable could not be parsed
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    /// The resulting task configuration is inconsistent
    #[error("invalid configuration for task type {task_type}: {reason}")]
    Task { task_type: String, reason: String },
}

/// Which executor serves a task type
#[derive(Clone, PartialEq)]
pub enum ExecutorKind {
    /// POST each record to a URL
    Webhook {
        url: String,
        secret: Option<String>,
        timeout: Duration,
    },
    /// Log each record and succeed
    Log,
}

impl std::fmt::Debug for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Webhook {
                url,
                secret,
                timeout,
            } => f
                .debug_struct("Webhook")
                .field("url", url)
                .field("secret", &secret.as_ref().map(|_| "[REDACTED]"))
                .field("timeout", timeout)
                .finish(),
            Self::Log => f.write_str("Log"),
        }
    }
}

/// One served task type
#[derive(Debug, Clone)]
pub struct TaskTypeConfig {
    pub task: TaskConfig,
    pub executor: ExecutorKind,
}

/// Worker process configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub shutdown_timeout: Duration,
    pub task_types: Vec<TaskTypeConfig>,
}

const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_WEBHOOK_TIMEOUT_MS: u64 = 10_000;

impl WorkerConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup` (key -> value)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let database_url = env.get("DATABASE_URL");
        let max_connections = env.parse::<u32>("DATABASE_MAX_CONNECTIONS")?.unwrap_or(10);
        let shutdown_timeout = Duration::from_millis(
            env.parse("COURIER_SHUTDOWN_TIMEOUT_MS")?
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_MS),
        );

        let names = env
            .get("COURIER_TASK_TYPES")
            .ok_or_else(|| ConfigError::Missing("COURIER_TASK_TYPES".to_string()))?;
        let names: Vec<&str> = names
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if names.is_empty() {
            return Err(ConfigError::Missing("COURIER_TASK_TYPES".to_string()));
        }

        let task_types = names
            .into_iter()
            .map(|name| env.task_type(name, shutdown_timeout))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            database_url,
            max_connections,
            shutdown_timeout,
            task_types,
        })
    }
}

/// `COURIER_<TYPE>_` prefix for a task type
pub fn env_prefix(task_type: &str) -> String {
    let normalized: String = task_type
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("COURIER_{normalized}_")
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|value| {
                value.parse::<T>().map_err(|e| ConfigError::Invalid {
                    key: key.to_string(),
                    value: value.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn millis(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_millis))
    }

    fn house_numbers(&self, key: &str) -> Result<Option<Vec<i32>>, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let invalid = |reason: String| ConfigError::Invalid {
            key: key.to_string(),
            value: value.clone(),
            reason,
        };

        if !value.contains(',') {
            let count: usize = value.parse().map_err(|e| invalid(format!("{e}")))?;
            return Ok(Some((0..count as i32).collect()));
        }

        let mut numbers = Vec::new();
        for part in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let number: i32 = part.parse().map_err(|e| invalid(format!("{part}: {e}")))?;
            if numbers.contains(&number) {
                return Err(invalid(format!("duplicate house number {number}")));
            }
            numbers.push(number);
        }
        Ok(Some(numbers))
    }

    fn task_type(
        &self,
        name: &str,
        shutdown_timeout: Duration,
    ) -> Result<TaskTypeConfig, ConfigError> {
        let prefix = env_prefix(name);
        let key = |suffix: &str| format!("{prefix}{suffix}");

        let mut task = TaskConfig::new(name).with_shutdown_timeout(shutdown_timeout);
        if let Some(enabled) = self.parse(&key("ENABLED"))? {
            task = task.with_enabled(enabled);
        }
        if let Some(house_numbers) = self.house_numbers(&key("HOUSE_NUMBERS"))? {
            task = task.with_house_numbers(house_numbers);
        }
        if let Some(interval) = self.millis(&key("POLL_INTERVAL_MS"))? {
            task = task.with_poll_interval(interval);
        }
        if let Some(limit) = self.parse(&key("FETCH_LIMIT"))? {
            task = task.with_fetch_limit(limit);
        }
        if let Some(max_retry) = self.parse(&key("MAX_RETRY"))? {
            task = task.with_max_retry(max_retry);
        }
        if let Some(delay) = self.millis(&key("BASE_DELAY_MS"))? {
            task = task.with_base_delay(delay);
        }
        if let Some(delay) = self.millis(&key("MAX_DELAY_MS"))? {
            task = task.with_max_delay(delay);
        }
        if let Some(strategy) = self.parse(&key("BACKOFF"))? {
            task = task.with_backoff_strategy(strategy);
        }
        if let Some(multiplier) = self.parse(&key("BACKOFF_MULTIPLIER"))? {
            task = task.with_backoff_multiplier(multiplier);
        }
        if let Some(strategy) = self.parse(&key("PARTITION"))? {
            task = task.with_partition_strategy(strategy);
        }
        if let Some(max) = self.parse(&key("MAX_CONCURRENCY"))? {
            task = task.with_max_concurrency(max);
        }
        if let Some(threshold) = self.millis(&key("STALE_THRESHOLD_MS"))? {
            task = task.with_stale_threshold(threshold);
        }

        task.validate().map_err(|reason| ConfigError::Task {
            task_type: name.to_string(),
            reason,
        })?;

        let executor = match self.get(&key("WEBHOOK_URL")) {
            Some(url) => ExecutorKind::Webhook {
                url,
                secret: self.get(&key("WEBHOOK_SECRET")),
                timeout: self
                    .millis(&key("WEBHOOK_TIMEOUT_MS"))?
                    .unwrap_or(Duration::from_millis(DEFAULT_WEBHOOK_TIMEOUT_MS)),
            },
            None => ExecutorKind::Log,
        };

        Ok(TaskTypeConfig { task, executor })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use courier_outbox::{BackoffStrategy, PartitionStrategy};

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(env_prefix("order_webhook"), "COURIER_ORDER_WEBHOOK_");
        assert_eq!(env_prefix("email.send-v2"), "COURIER_EMAIL_SEND_V2_");
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("COURIER_TASK_TYPES", "email")]).unwrap();

        assert!(config.database_url.is_none());
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.task_types.len(), 1);

        let email = &config.task_types[0];
        assert_eq!(email.task.task_type, "email");
        assert_eq!(email.task.poll_interval, Duration::from_secs(10));
        assert_eq!(email.task.fetch_limit, 100);
        assert_eq!(email.task.max_retry, 3);
        assert_eq!(email.task.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(email.executor, ExecutorKind::Log);
    }

    #[test]
    fn test_task_type_overrides() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/courier"),
            ("COURIER_TASK_TYPES", "order_webhook, sms"),
            ("COURIER_SHUTDOWN_TIMEOUT_MS", "5000"),
            ("COURIER_ORDER_WEBHOOK_HOUSE_NUMBERS", "4"),
            ("COURIER_ORDER_WEBHOOK_POLL_INTERVAL_MS", "500"),
            ("COURIER_ORDER_WEBHOOK_FETCH_LIMIT", "50"),
            ("COURIER_ORDER_WEBHOOK_MAX_RETRY", "8"),
            ("COURIER_ORDER_WEBHOOK_BASE_DELAY_MS", "200"),
            ("COURIER_ORDER_WEBHOOK_MAX_DELAY_MS", "60000"),
            ("COURIER_ORDER_WEBHOOK_BACKOFF", "exponential"),
            ("COURIER_ORDER_WEBHOOK_BACKOFF_MULTIPLIER", "3"),
            ("COURIER_ORDER_WEBHOOK_PARTITION", "business_key"),
            ("COURIER_ORDER_WEBHOOK_MAX_CONCURRENCY", "16"),
            ("COURIER_ORDER_WEBHOOK_STALE_THRESHOLD_MS", "120000"),
            ("COURIER_ORDER_WEBHOOK_WEBHOOK_URL", "https://hooks.example.com/orders"),
            ("COURIER_ORDER_WEBHOOK_WEBHOOK_SECRET", "s3cret"),
            ("COURIER_SMS_HOUSE_NUMBERS", "2,5,7"),
            ("COURIER_SMS_ENABLED", "false"),
        ])
        .unwrap();

        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/courier")
        );
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));

        let orders = &config.task_types[0].task;
        assert_eq!(orders.house_numbers, vec![0, 1, 2, 3]);
        assert_eq!(orders.poll_interval, Duration::from_millis(500));
        assert_eq!(orders.fetch_limit, 50);
        assert_eq!(orders.max_retry, 8);
        assert_eq!(orders.base_delay, Duration::from_millis(200));
        assert_eq!(orders.max_delay, Duration::from_secs(60));
        assert_eq!(orders.backoff_strategy, BackoffStrategy::Exponential);
        assert_eq!(orders.backoff_multiplier, 3.0);
        assert_eq!(orders.partition_strategy, PartitionStrategy::BusinessKey);
        assert_eq!(orders.max_concurrency, Some(16));
        assert_eq!(orders.stale_threshold, Some(Duration::from_secs(120)));
        assert_eq!(orders.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(
            config.task_types[0].executor,
            ExecutorKind::Webhook {
                url: "https://hooks.example.com/orders".to_string(),
                secret: Some("s3cret".to_string()),
                timeout: Duration::from_secs(10),
            }
        );

        let sms = &config.task_types[1].task;
        assert_eq!(sms.house_numbers, vec![2, 5, 7]);
        assert!(!sms.enabled);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let kind = ExecutorKind::Webhook {
            url: "https://hooks.example.com".to_string(),
            secret: Some("s3cret".to_string()),
            timeout: Duration::from_secs(1),
        };
        let rendered = format!("{kind:?}");
        assert!(rendered.contains("hooks.example.com"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_missing_task_types() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing(_))));
        assert!(matches!(
            config(&[("COURIER_TASK_TYPES", " , ")]),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let result = config(&[
            ("COURIER_TASK_TYPES", "email"),
            ("COURIER_EMAIL_BACKOFF", "random"),
        ]);
        assert!(matches!(result, Err(ConfigError::Invalid { key, .. }) if key == "COURIER_EMAIL_BACKOFF"));

        let result = config(&[
            ("COURIER_TASK_TYPES", "email"),
            ("COURIER_EMAIL_HOUSE_NUMBERS", "1,1"),
        ]);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));

        let result = config(&[
            ("COURIER_TASK_TYPES", "email"),
            ("COURIER_EMAIL_FETCH_LIMIT", "ten"),
        ]);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_inconsistent_task_config() {
        let result = config(&[
            ("COURIER_TASK_TYPES", "email"),
            ("COURIER_EMAIL_BASE_DELAY_MS", "10000"),
            ("COURIER_EMAIL_MAX_DELAY_MS", "1000"),
        ]);
        assert!(matches!(result, Err(ConfigError::Task { task_type, .. }) if task_type == "email"));

        let result = config(&[
            ("COURIER_TASK_TYPES", "email"),
            ("COURIER_EMAIL_HOUSE_NUMBERS", "0"),
        ]);
        assert!(matches!(result, Err(ConfigError::Task { .. })));
    }
}
