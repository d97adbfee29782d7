//! Reliability patterns for outbox delivery
//!
//! This module provides:
//! - [`BackoffPolicy`] - Retry delay calculation (fixed, linear, exponential)

mod backoff;

pub use backoff::{delay, BackoffPolicy, BackoffStrategy, DEFAULT_MULTIPLIER};
