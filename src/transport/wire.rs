use crate::error::{MofkaError, Result};

/// Splits a flat `bytes` buffer into blocks whose lengths are given by
/// `sizes`, validating that they sum to the buffer's length.
///
/// Sizes travel alongside the buffer as their own field (matching the
/// parallel `meta_sizes`/`meta_bytes` vectors spec.md §4.4 and §6
/// describe) rather than as an inline header.
pub fn split_by_sizes(bytes: &[u8], sizes: &[u64]) -> Result<Vec<Vec<u8>>> {
    let declared_total: u64 = sizes.iter().sum();
    if declared_total as usize != bytes.len() {
        return Err(MofkaError::Protocol(format!(
            "declared size sum {declared_total} does not match buffer length {}",
            bytes.len()
        )));
    }
    let mut blocks = Vec::with_capacity(sizes.len());
    let mut offset = 0usize;
    for &size in sizes {
        let size = size as usize;
        blocks.push(bytes[offset..offset + size].to_vec());
        offset += size;
    }
    Ok(blocks)
}

/// Concatenates `blocks` into one buffer plus the parallel size list,
/// the inverse of `split_by_sizes`.
pub fn join_by_sizes(blocks: &[Vec<u8>]) -> (Vec<u64>, Vec<u8>) {
    let sizes = blocks.iter().map(|b| b.len() as u64).collect();
    let bytes = blocks.concat();
    (sizes, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_then_split_round_trips() {
        let items = vec![vec![1, 2, 3], vec![], vec![4, 5]];
        let (sizes, bytes) = join_by_sizes(&items);
        assert_eq!(split_by_sizes(&bytes, &sizes).unwrap(), items);
    }

    #[test]
    fn split_rejects_size_mismatch() {
        let sizes = vec![3u64, 2];
        let bytes = vec![0u8; 4];
        assert!(split_by_sizes(&bytes, &sizes).is_err());
    }
}
