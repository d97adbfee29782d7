//! House number assignment

use sha2::{Digest, Sha256};

use crate::task::PartitionStrategy;

/// Stable 64-bit hash of a business id (first 8 bytes of its SHA-256)
pub fn business_key_hash(business_id: &str) -> u64 {
    let digest = Sha256::digest(business_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Maps submissions onto the engine's house numbers
#[derive(Debug, Clone)]
pub struct Partitioner {
    strategy: PartitionStrategy,
    house_numbers: Vec<i32>,
}

impl Partitioner {
    /// `house_numbers` must not be empty
    pub fn new(strategy: PartitionStrategy, house_numbers: Vec<i32>) -> Self {
        debug_assert!(!house_numbers.is_empty());
        Self {
            strategy,
            house_numbers,
        }
    }

    /// Index into the house-number set, in `[0, len)`
    pub fn index(&self, sequence: u64, business_id: &str) -> usize {
        let key = match self.strategy {
            PartitionStrategy::Sequence => sequence,
            PartitionStrategy::BusinessKey => business_key_hash(business_id),
        };
        (key % self.house_numbers.len() as u64) as usize
    }

    /// House number for a submission
    pub fn assign(&self, sequence: u64, business_id: &str) -> i32 {
        self.house_numbers[self.index(sequence, business_id)]
    }

    pub fn house_numbers(&self) -> &[i32] {
        &self.house_numbers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_distribution_is_uniform() {
        let partitioner = Partitioner::new(PartitionStrategy::Sequence, vec![0, 1, 2, 3, 4]);
        let mut counts = [0usize; 5];
        for seq in 1_000..2_000u64 {
            let house = partitioner.assign(seq, "same-business-id");
            counts[house as usize] += 1;
        }
        for count in counts {
            assert!((180..=220).contains(&count), "unbalanced: {counts:?}");
        }
    }

    #[test]
    fn test_index_is_in_bounds() {
        let partitioner = Partitioner::new(PartitionStrategy::BusinessKey, vec![10, 20, 30]);
        for i in 0..500u64 {
            let business_id = format!("order-{i}");
            assert!(partitioner.index(i, &business_id) < 3);
            assert!([10, 20, 30].contains(&partitioner.assign(i, &business_id)));
        }
    }

    #[test]
    fn test_business_key_affinity() {
        let partitioner = Partitioner::new(PartitionStrategy::BusinessKey, vec![0, 1, 2, 3]);
        let first = partitioner.assign(1, "order-42");
        for seq in 2..50 {
            assert_eq!(partitioner.assign(seq, "order-42"), first);
        }
    }

    #[test]
    fn test_business_key_hash_is_stable() {
        assert_eq!(business_key_hash("order-42"), business_key_hash("order-42"));
        assert_ne!(business_key_hash("order-42"), business_key_hash("order-43"));
        // SHA-256("") starts with e3b0c44298fc1c14
        assert_eq!(business_key_hash(""), 0xe3b0_c442_98fc_1c14);
    }

    #[test]
    fn test_single_house_number() {
        let partitioner = Partitioner::new(PartitionStrategy::Sequence, vec![7]);
        assert_eq!(partitioner.assign(123, "x"), 7);
        assert_eq!(partitioner.house_numbers(), &[7]);
    }
}
