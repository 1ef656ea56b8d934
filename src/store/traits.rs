use async_trait::async_trait;

use crate::descriptor::DataDescriptor;
use crate::error::Result;
use crate::transport::BulkRef;

/// Payload storage backing a single partition (spec.md §4.2,
/// GLOSSARY "DataStore").
///
/// A DataStore never sees Event metadata — only raw bytes and the
/// sizes that carve them into per-event payloads. It hands back one
/// opaque `DataDescriptor` per stored event, and later resolves that
/// descriptor (plus any view-transform chain applied to it) back into
/// bytes on `load`.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Pull `count` payloads out of `sizes`/`data` and store them,
    /// returning one `DataDescriptor` per payload in order.
    ///
    /// `sizes` exposes `count` little-endian `u64` sizes; `data`
    /// exposes the concatenation of the `count` payloads in the same
    /// order, sized to the sum of `sizes`.
    async fn store(&self, count: usize, sizes: BulkRef, data: BulkRef)
        -> Result<Vec<DataDescriptor>>;

    /// Fetch the bytes named by `descriptors`, concatenated in order,
    /// into `dest`.
    ///
    /// Returns one `Result` per descriptor, in order, so a malformed
    /// or out-of-range descriptor doesn't abort the whole call: the
    /// other descriptors in the same batch still resolve (spec.md
    /// §4.4 `getData` — "partial success is reportable").
    async fn load(&self, descriptors: &[DataDescriptor], dest: BulkRef) -> Result<Vec<Result<()>>>;

    /// Discard all stored payloads, invalidating every previously
    /// issued `DataDescriptor`.
    async fn destroy(&self) -> Result<()>;
}
