/// A single contiguous piece of an externally-owned buffer.
///
/// Mirrors one entry of the scatter/gather list a real Mofka `Data`
/// object exposes to the transport layer. This crate owns the bytes
/// directly (`Vec<u8>`) rather than a raw pointer/length pair, since
/// there is no real RPC transport pulling bytes out of foreign memory
/// here — but the shape (many segments, one logical stream) is kept so
/// a real transport binding could swap the owned `Vec<u8>` for a
/// borrowed pointer without touching the rest of the crate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSegment(pub Vec<u8>);

impl DataSegment {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A possibly-scattered view over payload bytes, attached to one event
/// on push (producer side) or handed back by a `DataAllocator` on
/// receive (consumer side).
///
/// The runtime never assumes ownership of the segments beyond the
/// lifetime of the operation that consumes them (producer push /
/// consumer fetch) — see spec.md §9 "DataView scatter-gather
/// ownership".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataView {
    segments: Vec<DataSegment>,
    total_size: usize,
}

impl DataView {
    /// An empty DataView: the event carries no payload.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a DataView from a single contiguous buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let total_size = bytes.len();
        Self {
            segments: vec![DataSegment(bytes)],
            total_size,
        }
    }

    /// Build a DataView from a list of scattered segments.
    pub fn from_segments(segments: Vec<Vec<u8>>) -> Self {
        let total_size = segments.iter().map(|s| s.len()).sum();
        Self {
            segments: segments.into_iter().map(DataSegment).collect(),
            total_size,
        }
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    pub fn segments(&self) -> &[DataSegment] {
        &self.segments
    }

    /// Flatten into one contiguous buffer, concatenating segments in
    /// order. Used by the reference `MemoryDataStore` which keeps
    /// payloads in one flat vector.
    pub fn to_contiguous(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_size);
        for seg in &self.segments {
            out.extend_from_slice(&seg.0);
        }
        out
    }
}

impl From<Vec<u8>> for DataView {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_view_has_zero_size() {
        let v = DataView::empty();
        assert_eq!(v.total_size(), 0);
        assert!(v.is_empty());
    }

    #[test]
    fn scattered_segments_sum_to_total_size() {
        let v = DataView::from_segments(vec![vec![1, 2, 3], vec![4, 5]]);
        assert_eq!(v.total_size(), 5);
        assert_eq!(v.to_contiguous(), vec![1, 2, 3, 4, 5]);
    }
}
