use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{MofkaError, Result};

use super::traits::BulkHandle;

/// In-process reference `BulkHandle`: a plain, mutex-guarded byte
/// buffer exposed for pull/push.
///
/// Stands in for a real RDMA/RMA-backed bulk region. Bounds-checks
/// every pull/push against the buffer's current length, surfacing
/// `Protocol` on a truncated or oversized transfer the way a real
/// transport would when a byte-count mismatch occurs (spec.md §7
/// kind 7).
#[derive(Debug, Default)]
pub struct LocalBulk {
    bytes: Mutex<Vec<u8>>,
}

impl LocalBulk {
    pub fn new(bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            bytes: Mutex::new(bytes),
        })
    }

    /// A bulk region pre-sized to `len` zero bytes, ready to be
    /// `push`ed into by a sender.
    pub fn with_capacity(len: usize) -> Arc<Self> {
        Self::new(vec![0u8; len])
    }

    pub fn into_inner(self: Arc<Self>) -> Vec<u8> {
        Arc::try_unwrap(self)
            .map(|s| s.bytes.into_inner())
            .unwrap_or_else(|arc| arc.bytes.lock().clone())
    }
}

#[async_trait]
impl BulkHandle for LocalBulk {
    fn size(&self) -> usize {
        self.bytes.lock().len()
    }

    async fn pull(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let guard = self.bytes.lock();
        if offset + len > guard.len() {
            return Err(MofkaError::Protocol(format!(
                "pull({offset}, {len}) exceeds bulk region of size {}",
                guard.len()
            )));
        }
        Ok(guard[offset..offset + len].to_vec())
    }

    async fn push(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        let mut guard = self.bytes.lock();
        if offset + bytes.len() > guard.len() {
            return Err(MofkaError::Protocol(format!(
                "push at {offset} of {} bytes exceeds bulk region of size {}",
                bytes.len(),
                guard.len()
            )));
        }
        guard[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// Producer → PartitionManager batch, and PartitionManager → Consumer
/// feed — both have the identical shape spec.md §6 describes: parallel
/// metadata and data-descriptor size/bytes blocks.
///
/// Because the real RPC transport is out of scope, this struct plays
/// the role the abstract bulk layout would over a socket: it carries
/// the same fields a real implementation would serialize, so the
/// size-accounting invariants (`receiveBatch` step 4's post-condition)
/// stay meaningful even though no bytes actually cross a network.
#[derive(Debug, Clone, Default)]
pub struct BatchPayload {
    pub meta_sizes: Vec<u64>,
    pub meta_bytes: Vec<u8>,
    pub desc_sizes: Vec<u64>,
    pub desc_bytes: Vec<u8>,
}

/// Feed batches carry the same four blocks as a producer batch.
pub type FeedPayload = BatchPayload;

impl BatchPayload {
    pub fn from_blocks(metas: &[Vec<u8>], descs: &[Vec<u8>]) -> Self {
        let (meta_sizes, meta_bytes) = super::wire::join_by_sizes(metas);
        let (desc_sizes, desc_bytes) = super::wire::join_by_sizes(descs);
        Self {
            meta_sizes,
            meta_bytes,
            desc_sizes,
            desc_bytes,
        }
    }

    pub fn count(&self) -> usize {
        self.meta_sizes.len()
    }

    pub fn meta_blocks(&self) -> Result<Vec<Vec<u8>>> {
        super::wire::split_by_sizes(&self.meta_bytes, &self.meta_sizes)
    }

    pub fn desc_blocks(&self) -> Result<Vec<Vec<u8>>> {
        super::wire::split_by_sizes(&self.desc_bytes, &self.desc_sizes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_payload_round_trips_blocks() {
        let metas = vec![vec![1, 2], vec![3]];
        let descs = vec![vec![9], vec![8, 7]];
        let payload = BatchPayload::from_blocks(&metas, &descs);
        assert_eq!(payload.count(), 2);
        assert_eq!(payload.meta_blocks().unwrap(), metas);
        assert_eq!(payload.desc_blocks().unwrap(), descs);
    }

    #[tokio::test]
    async fn pull_returns_requested_window() {
        let bulk = LocalBulk::new(vec![1, 2, 3, 4, 5]);
        assert_eq!(bulk.pull(1, 3).await.unwrap(), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn pull_out_of_bounds_is_protocol_error() {
        let bulk = LocalBulk::new(vec![1, 2, 3]);
        let err = bulk.pull(1, 10).await.unwrap_err();
        assert!(matches!(err, MofkaError::Protocol(_)));
    }

    #[tokio::test]
    async fn push_then_pull_round_trips() {
        let bulk = LocalBulk::with_capacity(4);
        bulk.push(0, &[9, 9, 9, 9]).await.unwrap();
        assert_eq!(bulk.pull(0, 4).await.unwrap(), vec![9, 9, 9, 9]);
    }
}
