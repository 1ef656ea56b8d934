use serde::{Deserialize, Serialize};

use crate::error::{MofkaError, Result};

/// One step in a DataDescriptor's view-transform chain.
///
/// The chain is only ever interpreted by the DataStore that owns the
/// underlying bytes (see `MemoryDataStore::load`); everywhere else the
/// descriptor travels unchanged, as an opaque token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewTransform {
    /// A contiguous sub-range `[offset, offset+size)` of the parent view.
    Sub { offset: usize, size: usize },
    /// `num_blocks` blocks of `block_size` bytes each, starting at
    /// `offset`, separated by `gap_size` bytes between consecutive
    /// blocks.
    Strided {
        offset: usize,
        num_blocks: usize,
        block_size: usize,
        gap_size: usize,
    },
    /// An arbitrary list of `(offset, size)` segments.
    Unstructured { segments: Vec<(usize, usize)> },
}

impl ViewTransform {
    fn size(&self) -> usize {
        match self {
            ViewTransform::Sub { size, .. } => *size,
            ViewTransform::Strided {
                num_blocks,
                block_size,
                ..
            } => num_blocks * block_size,
            ViewTransform::Unstructured { segments } => segments.iter().map(|(_, s)| s).sum(),
        }
    }
}

/// Opaque, serializable location token produced by a partition's
/// DataStore when it ingests payload bytes.
///
/// A descriptor is later presented back to the same DataStore to
/// fetch, slice (sub-range, strided, or unstructured view), or discard
/// the payload. The location itself is meaningless outside the
/// DataStore that produced it — this crate never inspects its
/// contents except to decode/encode it as a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDescriptor {
    location: String,
    base_size: usize,
    views: Vec<ViewTransform>,
}

impl DataDescriptor {
    /// Build a descriptor for a freshly-stored piece of data.
    pub fn from_location(location: String, size: usize) -> Self {
        Self {
            location,
            base_size: size,
            views: Vec::new(),
        }
    }

    /// A sentinel descriptor of size 0, meaning "skip this payload".
    pub fn null() -> Self {
        Self {
            location: String::new(),
            base_size: 0,
            views: Vec::new(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.current_size() == 0
    }

    /// The opaque location string, meaningful only to the DataStore
    /// that produced this descriptor.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The chain of view transforms to apply, in order, over the
    /// location's base bytes.
    pub fn views(&self) -> &[ViewTransform] {
        &self.views
    }

    /// The size of the data this descriptor currently refers to, i.e.
    /// the size of the last view transform in the chain, or the base
    /// size if the chain is empty.
    pub fn current_size(&self) -> usize {
        self.views.last().map(ViewTransform::size).unwrap_or(self.base_size)
    }

    /// Returns a descriptor narrowed to `[offset, offset+size)` of the
    /// current view.
    ///
    /// `d.sub_view(0, d.current_size())` returns a descriptor equal to
    /// `d`. Composing two sub-views is equivalent to one sub-view over
    /// the sum of offsets: `d.sub_view(a,b).sub_view(c,e) ==
    /// d.sub_view(a+c,e)` whenever `c+e <= b`.
    pub fn sub_view(&self, offset: usize, size: usize) -> Result<Self> {
        let current = self.current_size();
        if offset + size > current {
            return Err(MofkaError::Protocol(format!(
                "sub_view({offset}, {size}) out of bounds for descriptor of size {current}"
            )));
        }
        if offset == 0 && size == current {
            return Ok(self.clone());
        }
        let mut views = self.views.clone();
        match views.last() {
            Some(ViewTransform::Sub {
                offset: prev_offset,
                ..
            }) => {
                let merged = ViewTransform::Sub {
                    offset: prev_offset + offset,
                    size,
                };
                views.pop();
                views.push(merged);
            }
            _ => views.push(ViewTransform::Sub { offset, size }),
        }
        Ok(Self {
            location: self.location.clone(),
            base_size: self.base_size,
            views,
        })
    }

    /// Returns a strided view: `num_blocks` blocks of `block_size`
    /// bytes, `gap_size` bytes apart, starting at `offset` within the
    /// current view.
    pub fn strided_view(
        &self,
        offset: usize,
        num_blocks: usize,
        block_size: usize,
        gap_size: usize,
    ) -> Result<Self> {
        let span = if num_blocks == 0 {
            0
        } else {
            (num_blocks - 1) * (block_size + gap_size) + block_size
        };
        if offset + span > self.current_size() {
            return Err(MofkaError::Protocol(format!(
                "strided_view out of bounds: offset {offset} + span {span} > {}",
                self.current_size()
            )));
        }
        let mut views = self.views.clone();
        views.push(ViewTransform::Strided {
            offset,
            num_blocks,
            block_size,
            gap_size,
        });
        Ok(Self {
            location: self.location.clone(),
            base_size: self.base_size,
            views,
        })
    }

    /// Returns an unstructured view over an arbitrary list of
    /// `(offset, size)` segments within the current view.
    pub fn unstructured_view(&self, segments: Vec<(usize, usize)>) -> Result<Self> {
        let current = self.current_size();
        for (offset, size) in &segments {
            if offset + size > current {
                return Err(MofkaError::Protocol(format!(
                    "unstructured_view segment ({offset}, {size}) out of bounds for size {current}"
                )));
            }
        }
        let mut views = self.views.clone();
        views.push(ViewTransform::Unstructured { segments });
        Ok(Self {
            location: self.location.clone(),
            base_size: self.base_size,
            views,
        })
    }

    /// Folds this descriptor's view chain into a concrete list of
    /// `(absolute_offset, size)` byte ranges, given the absolute
    /// offset at which this descriptor's base bytes begin.
    ///
    /// A DataStore calls this at `load` time: it owns the mapping
    /// from `location()` to an absolute offset, and defers all view
    /// interpretation (sub/strided/unstructured) to this shared
    /// routine so every backing store honours the same algebra.
    pub fn resolve_segments(&self, base_offset: usize) -> Vec<(usize, usize)> {
        let mut segments = vec![(base_offset, self.base_size)];
        for view in &self.views {
            segments = match view {
                ViewTransform::Sub { offset, size } => virtual_slice(&segments, *offset, *size),
                ViewTransform::Strided {
                    offset,
                    num_blocks,
                    block_size,
                    gap_size,
                } => {
                    let mut out = Vec::new();
                    for i in 0..*num_blocks {
                        let block_offset = offset + i * (block_size + gap_size);
                        out.extend(virtual_slice(&segments, block_offset, *block_size));
                    }
                    out
                }
                ViewTransform::Unstructured { segments: ranges } => {
                    let mut out = Vec::new();
                    for (offset, size) in ranges {
                        out.extend(virtual_slice(&segments, *offset, *size));
                    }
                    out
                }
            };
        }
        segments
    }
}

/// Extracts the `[offset, offset+size)` window of the virtual byte
/// stream formed by concatenating `segments`, returning it as
/// concrete `(absolute_offset, size)` ranges (possibly spanning more
/// than one input segment).
fn virtual_slice(segments: &[(usize, usize)], offset: usize, size: usize) -> Vec<(usize, usize)> {
    let mut result = Vec::new();
    let mut to_skip = offset;
    let mut to_take = size;
    for &(seg_offset, seg_size) in segments {
        if to_take == 0 {
            break;
        }
        if to_skip >= seg_size {
            to_skip -= seg_size;
            continue;
        }
        let start_in_seg = to_skip;
        let available = seg_size - start_in_seg;
        let take = available.min(to_take);
        result.push((seg_offset + start_in_seg, take));
        to_take -= take;
        to_skip = 0;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_descriptor_has_zero_size() {
        assert!(DataDescriptor::null().is_null());
    }

    #[test]
    fn full_sub_view_is_identity() {
        let d = DataDescriptor::from_location("loc".to_string(), 1024);
        assert_eq!(d.sub_view(0, 1024).unwrap(), d);
    }

    #[test]
    fn sub_view_composition_matches_single_sub_view() {
        let d = DataDescriptor::from_location("loc".to_string(), 1024);
        let composed = d.sub_view(16, 512).unwrap().sub_view(4, 64).unwrap();
        let direct = d.sub_view(20, 64).unwrap();
        assert_eq!(composed, direct);
    }

    #[test]
    fn sub_view_out_of_bounds_is_rejected() {
        let d = DataDescriptor::from_location("loc".to_string(), 10);
        assert!(d.sub_view(8, 4).is_err());
    }

    #[test]
    fn strided_view_size_is_blocks_times_block_size() {
        let d = DataDescriptor::from_location("loc".to_string(), 1024);
        let s = d.strided_view(16, 4, 32, 16).unwrap();
        assert_eq!(s.current_size(), 4 * 32);
    }

    #[test]
    fn unstructured_view_size_is_sum_of_segments() {
        let d = DataDescriptor::from_location("loc".to_string(), 1024);
        let u = d.unstructured_view(vec![(0, 10), (100, 20), (500, 5)]).unwrap();
        assert_eq!(u.current_size(), 35);
    }

    #[test]
    fn resolve_segments_with_no_views_is_base_range() {
        let d = DataDescriptor::from_location("loc".to_string(), 100);
        assert_eq!(d.resolve_segments(1000), vec![(1000, 100)]);
    }

    #[test]
    fn resolve_segments_respects_sub_view() {
        let d = DataDescriptor::from_location("loc".to_string(), 100)
            .sub_view(10, 20)
            .unwrap();
        assert_eq!(d.resolve_segments(1000), vec![(1010, 20)]);
    }

    #[test]
    fn resolve_segments_expands_strided_view_into_blocks() {
        let d = DataDescriptor::from_location("loc".to_string(), 100)
            .strided_view(0, 3, 4, 6)
            .unwrap();
        assert_eq!(d.resolve_segments(0), vec![(0, 4), (10, 4), (20, 4)]);
    }

    #[test]
    fn resolve_segments_honours_unstructured_segments() {
        let d = DataDescriptor::from_location("loc".to_string(), 100)
            .unstructured_view(vec![(5, 3), (50, 2)])
            .unwrap();
        assert_eq!(d.resolve_segments(1000), vec![(1005, 3), (1050, 2)]);
    }
}
