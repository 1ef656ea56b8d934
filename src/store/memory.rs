use parking_lot::Mutex;
use tracing::debug;

use crate::descriptor::DataDescriptor;
use crate::error::Result;
use crate::transport::BulkRef;

use super::traits::DataStore;

/// Reference in-memory `DataStore`, grounded directly on
/// `MemoryDataStore.hpp`: one growable byte buffer plus the location
/// each stored event's bytes start at, behind a single lock.
#[derive(Default)]
pub struct MemoryDataStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    data: Vec<u8>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves one descriptor's bytes out of `data` and appends them
    /// to `buf`. On failure, pads `buf` with `descriptor.current_size()`
    /// zero bytes instead so every later descriptor in the same `load`
    /// call still lands at the offset `dest` expects it at.
    fn resolve_one(data: &[u8], descriptor: &DataDescriptor, buf: &mut Vec<u8>) -> Result<()> {
        let start_len = buf.len();
        let result = (|| -> Result<()> {
            let base_offset: usize = descriptor.location().parse().map_err(|_| {
                crate::error::MofkaError::Protocol(format!(
                    "malformed location token {:?}",
                    descriptor.location()
                ))
            })?;
            for (offset, size) in descriptor.resolve_segments(base_offset) {
                let end = offset
                    .checked_add(size)
                    .filter(|&end| end <= data.len())
                    .ok_or_else(|| {
                        crate::error::MofkaError::Protocol(format!(
                            "descriptor range {offset}..{} exceeds stored data of length {}",
                            offset + size,
                            data.len()
                        ))
                    })?;
                buf.extend_from_slice(&data[offset..end]);
            }
            Ok(())
        })();
        if result.is_err() {
            // Discard whatever partial segments made it in and reserve
            // exactly `current_size()` zero bytes, so later descriptors
            // in the same `load` call still land at the offset `dest`
            // expects.
            buf.truncate(start_len);
            buf.resize(start_len + descriptor.current_size(), 0);
        }
        result
    }
}

#[async_trait::async_trait]
impl DataStore for MemoryDataStore {
    async fn store(
        &self,
        count: usize,
        sizes: BulkRef,
        data: BulkRef,
    ) -> Result<Vec<DataDescriptor>> {
        let size_bytes = sizes.pull_all().await?;
        let sizes: Vec<usize> = size_bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()) as usize)
            .collect();
        debug_assert_eq!(sizes.len(), count);

        let payload = data.pull_all().await?;

        let mut inner = self.inner.lock();
        let old_len = inner.data.len();
        let new_len = old_len + payload.len();
        if inner.data.capacity() < new_len {
            inner.data.reserve(2 * new_len - inner.data.capacity());
        }
        inner.data.extend_from_slice(&payload);
        debug!(count, old_len, new_len, "stored batch payload");

        let mut descriptors = Vec::with_capacity(count);
        let mut offset = old_len;
        for size in sizes {
            descriptors.push(DataDescriptor::from_location(offset.to_string(), size));
            offset += size;
        }
        Ok(descriptors)
    }

    async fn load(&self, descriptors: &[DataDescriptor], dest: BulkRef) -> Result<Vec<Result<()>>> {
        let inner = self.inner.lock();
        let mut buf = Vec::with_capacity(
            descriptors.iter().map(DataDescriptor::current_size).sum(),
        );
        let mut outcomes = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if descriptor.is_null() {
                outcomes.push(Ok(()));
                continue;
            }
            let outcome = Self::resolve_one(&inner.data, descriptor, &mut buf);
            outcomes.push(outcome);
        }
        drop(inner);
        dest.handle.push(dest.offset, &buf).await?;
        Ok(outcomes)
    }

    async fn destroy(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.data.clear();
        inner.data.shrink_to_fit();
        Ok(())
    }
}
