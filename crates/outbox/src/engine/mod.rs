//! Poller engine
//!
//! The engine module provides the [`PollerEngine`] which submits, polls,
//! claims and executes records for one task type, and the
//! [`EngineRegistry`] which routes submissions across task types.

mod partition;
mod poller;
mod registry;

pub use partition::{business_key_hash, Partitioner};
pub use poller::{EngineError, PollerEngine, PollerEngineBuilder, TaskOutcome};
pub use registry::{EngineRegistry, RegistryError};
