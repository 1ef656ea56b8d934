use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{MofkaError, Result};
use crate::metadata::Metadata;

/// Maps an event's metadata to a partition index.
///
/// `set_partitions` is called once the topic's partition count is
/// known (or changes); `select_partition_for` is then called once per
/// push. If the caller requested a specific partition it must be
/// honoured or the call must fail (spec.md §4.3).
pub trait PartitionSelector: Send + Sync {
    /// Informs the selector how many partitions the topic currently has.
    fn set_partitions(&self, count: usize);

    /// Chooses a partition index for an event. If `requested` is
    /// `Some`, it must be returned unchanged or an error raised if out
    /// of range.
    fn select_partition_for(&self, metadata: &Metadata, requested: Option<usize>) -> Result<usize>;

    /// A snapshot sufficient to reconstruct this instance.
    fn metadata(&self) -> Metadata;
}

/// Round-robins across the topic's partitions.
///
/// Grounded on `docs/_code/energy_partition_selector.cpp` from the
/// original implementation (a round-robin selector is the example the
/// upstream docs ship).
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    num_partitions: AtomicUsize,
    next: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PartitionSelector for RoundRobinSelector {
    fn set_partitions(&self, count: usize) {
        self.num_partitions.store(count, Ordering::SeqCst);
    }

    fn select_partition_for(&self, _metadata: &Metadata, requested: Option<usize>) -> Result<usize> {
        let count = self.num_partitions.load(Ordering::SeqCst);
        if count == 0 {
            return Err(MofkaError::Protocol("topic has no partitions".to_string()));
        }
        if let Some(idx) = requested {
            if idx >= count {
                return Err(MofkaError::Protocol(format!(
                    "requested partition {idx} out of range (0..{count})"
                )));
            }
            return Ok(idx);
        }
        let idx = self.next.fetch_add(1, Ordering::SeqCst) % count;
        Ok(idx)
    }

    fn metadata(&self) -> Metadata {
        Metadata::new(serde_json::json!({ "type": "round_robin" }))
    }
}
