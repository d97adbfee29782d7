//! Unique id source
//!
//! Generated task ids are UUIDs. The low 64 bits of a generated id double as
//! the partition key for sequence partitioning, see [`sequence_key`].

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of unique task ids
pub trait IdGenerator: Send + Sync + 'static {
    /// Next id; never repeats
    fn next_id(&self) -> Uuid;
}

/// Partition key of a generated id (its low 64 bits)
///
/// For UUID v7 these are random bits, so keys spread evenly over any number
/// of house numbers.
pub fn sequence_key(id: &Uuid) -> u64 {
    id.as_u64_pair().1
}

/// Time-ordered UUID v7 ids, unique across processes
///
/// The default id source of every engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn next_id(&self) -> Uuid {
        Uuid::now_v7()
    }
}

/// Deterministic ids `start`, `start + 1`, ... rendered as UUIDs
///
/// Only unique within one instance. Useful in tests that need predictable
/// partition keys; two instances with overlapping ranges produce the same
/// ids.
#[derive(Debug)]
pub struct SequenceIdGenerator {
    next: AtomicU64,
}

impl SequenceIdGenerator {
    /// Create a generator whose first id has sequence key `start`
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn next_id(&self) -> Uuid {
        Uuid::from_u128(u128::from(self.next.fetch_add(1, Ordering::Relaxed)))
    }
}
