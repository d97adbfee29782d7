//! Executors shipped with the worker
//!
//! This module provides:
//! - [`WebhookExecutor`] - HTTP POST delivery with optional request signing
//! - [`LogExecutor`] - Logs records, for local runs without a target

mod log;
mod webhook;

pub use log::LogExecutor;
pub use webhook::{generate_signature, WebhookExecutor, SIGNATURE_HEADER};
