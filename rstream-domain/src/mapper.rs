//! Hash-ring queue mapper
//!
//! Queues sit at evenly spaced positions on a 32-bit ring. A stream belongs
//! to the first queue at or after its hash, wrapping to the first queue.

use crate::value_objects::{DomainError, QueueId, StreamIdentity};

/// Deterministic 32-bit hash of a stream identity.
///
/// 64-bit FNV-1a over `namespace \0 key`, mixed and folded to 32 bits, so the
/// value is the same in every process and toolchain.
pub fn uniform_hash(stream: &StreamIdentity) -> u32 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let bytes = stream
        .namespace()
        .as_bytes()
        .iter()
        .chain(std::iter::once(&0u8))
        .chain(stream.key().as_bytes());

    let mut hash = bytes.fold(OFFSET_BASIS, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME));

    // FNV-1a alone barely moves the high bits for keys differing in the
    // last byte; finish with the murmur3 64-bit mixer.
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff51afd7ed558ccd);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xc4ceb9fe1a85ec53);
    hash ^= hash >> 33;

    ((hash >> 32) ^ hash) as u32
}

/// Maps streams onto a fixed set of queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRingQueueMapper {
    queues: Vec<QueueId>,
}

impl HashRingQueueMapper {
    /// Build a ring of `queue_count` queues named after `prefix`.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidQueueCount` if `queue_count` is zero.
    pub fn new(prefix: &str, queue_count: u32) -> Result<Self, DomainError> {
        if queue_count == 0 {
            return Err(DomainError::InvalidQueueCount("queue count must be at least 1".to_string()));
        }

        let spacing = u32::MAX / queue_count;
        let queues = (0..queue_count)
            .map(|index| QueueId::new(prefix, index, spacing.wrapping_mul(index)))
            .collect();

        Ok(Self { queues })
    }

    /// Queue responsible for `stream`
    pub fn queue_for(&self, stream: &StreamIdentity) -> &QueueId {
        let hash = uniform_hash(stream);
        // Ring positions are ascending by construction.
        let index = self.queues.partition_point(|queue| queue.ring_position() < hash);
        self.queues.get(index).unwrap_or(&self.queues[0])
    }

    /// Every queue on the ring, in ring order
    pub fn all_queues(&self) -> &[QueueId] {
        &self.queues
    }

    /// Number of queues
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }
}
