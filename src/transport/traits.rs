use async_trait::async_trait;

use crate::error::Result;

/// A one-sided memory exposure used for zero-copy transfer (spec.md
/// §1, §4.2, GLOSSARY "Bulk").
///
/// The real RPC transport is out of scope for this crate (spec.md
/// §1): it is "assumed to provide reliable one-way invocations and
/// one-sided bulk transfers with remote-memory expose/pull
/// semantics". `BulkHandle` is the trait seam a real transport would
/// implement; `transport::local` ships the in-process reference
/// implementation this crate's own Producer/Consumer/PartitionManager
/// use so the runtime is exercisable without a network.
#[async_trait]
pub trait BulkHandle: Send + Sync {
    /// Total size, in bytes, of the exposed region.
    fn size(&self) -> usize;

    /// Pull `len` bytes starting at `offset` out of the exposed
    /// region (the puller is the receiver; the handle's owner is the
    /// sender who originally exposed the memory).
    async fn pull(&self, offset: usize, len: usize) -> Result<Vec<u8>>;

    /// Push `bytes` into the exposed region starting at `offset` (used
    /// by `DataStore::load` to deliver fetched payload bytes back into
    /// a consumer's destination buffer).
    async fn push(&self, offset: usize, bytes: &[u8]) -> Result<()>;
}

/// A bulk handle together with the offset/size window within it that
/// one particular operation should use — the abstract layout spec.md
/// §6 describes ("a bulk handle... offset at which to start").
#[derive(Clone)]
pub struct BulkRef {
    pub handle: std::sync::Arc<dyn BulkHandle>,
    pub offset: usize,
    pub size: usize,
}

impl BulkRef {
    pub fn whole(handle: std::sync::Arc<dyn BulkHandle>) -> Self {
        let size = handle.size();
        Self {
            handle,
            offset: 0,
            size,
        }
    }

    pub async fn pull_all(&self) -> Result<Vec<u8>> {
        self.handle.pull(self.offset, self.size).await
    }
}
