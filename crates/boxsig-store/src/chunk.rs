//! Splitting oversized payloads into ordered chunks
//!
//! A single contract call can carry at most [`CHUNK_SIZE`] bytes of payload
//! once the call envelope is accounted for, so larger transactions are
//! written as one "begin" call followed by "continue" calls, each carrying
//! the next chunk. The store appends chunks in the order they arrive.
//!
//! Empty payloads split into zero chunks.

use boxsig_errors::{Error, Result};

/// Payload bytes carried by one storage write
pub const CHUNK_SIZE: usize = 2000;

/// Split `payload` leftmost-first into chunks of `chunk_size` bytes
///
/// Every chunk but the last is exactly `chunk_size` long.
pub fn split(payload: &[u8], chunk_size: usize) -> Result<Vec<&[u8]>> {
    if chunk_size == 0 {
        return Err(Error::InvalidChunkSize);
    }
    Ok(payload.chunks(chunk_size).collect())
}

/// Number of chunks `split` produces for a payload of `total_len` bytes
pub fn chunk_count(total_len: usize, chunk_size: usize) -> Result<u32> {
    if chunk_size == 0 {
        return Err(Error::InvalidChunkSize);
    }
    u32::try_from(total_len.div_ceil(chunk_size))
        .map_err(|_| Error::EncodingError(format!("{total_len} bytes need too many chunks")))
}

/// Concatenate chunks back into the original payload
pub fn reassemble<B: AsRef<[u8]>>(chunks: &[B]) -> Vec<u8> {
    let total = chunks.iter().map(|c| c.as_ref().len()).sum();
    let mut payload = Vec::with_capacity(total);
    for chunk in chunks {
        payload.extend_from_slice(chunk.as_ref());
    }
    payload
}

/// A payload split for the begin/continue write sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan<'a> {
    total_len: usize,
    chunks: Vec<&'a [u8]>,
}

impl<'a> ChunkPlan<'a> {
    pub fn new(payload: &'a [u8], chunk_size: usize) -> Result<Self> {
        Ok(Self {
            total_len: payload.len(),
            chunks: split(payload, chunk_size)?,
        })
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Whether the payload fits a single write
    pub fn is_single(&self) -> bool {
        self.chunks.len() == 1
    }

    /// Chunk carried by the begin write
    pub fn first(&self) -> Option<&'a [u8]> {
        self.chunks.first().copied()
    }

    /// Chunks carried by the continue writes, in order
    pub fn rest(&self) -> &[&'a [u8]] {
        self.chunks.get(1..).unwrap_or(&[])
    }

    pub fn chunks(&self) -> &[&'a [u8]] {
        &self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_small_payload() {
        let payload = vec![0x42u8; 21];
        let chunks = split(&payload, CHUNK_SIZE).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunk_count(21, CHUNK_SIZE).unwrap(), 1);
        assert_eq!(chunks[0], &payload[..]);
    }

    #[test]
    fn test_large_payload_lengths() {
        let payload: Vec<u8> = (0..7432u32).map(|i| (i % 251) as u8).collect();
        let chunks = split(&payload, CHUNK_SIZE).unwrap();
        let lengths: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lengths, vec![2000, 2000, 2000, 1432]);
        assert_eq!(chunk_count(payload.len(), CHUNK_SIZE).unwrap(), 4);
        assert_eq!(reassemble(&chunks), payload);
    }

    #[test]
    fn test_exact_multiple() {
        let payload = vec![1u8; 4000];
        let chunks = split(&payload, CHUNK_SIZE).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == CHUNK_SIZE));
    }

    #[test]
    fn test_empty_payload_has_no_chunks() {
        assert!(split(&[], CHUNK_SIZE).unwrap().is_empty());
        assert_eq!(chunk_count(0, CHUNK_SIZE).unwrap(), 0);
        assert!(reassemble::<&[u8]>(&[]).is_empty());
        assert!(ChunkPlan::new(&[], CHUNK_SIZE).unwrap().is_empty());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert_eq!(split(b"abc", 0).unwrap_err(), Error::InvalidChunkSize);
        assert_eq!(chunk_count(3, 0).unwrap_err(), Error::InvalidChunkSize);
        assert_eq!(
            ChunkPlan::new(b"abc", 0).unwrap_err(),
            Error::InvalidChunkSize
        );
    }

    #[test]
    fn test_plan_first_and_rest() {
        let payload = b"abcdefghij";
        let plan = ChunkPlan::new(payload, 4).unwrap();
        assert_eq!(plan.total_len(), 10);
        assert_eq!(plan.first(), Some(&b"abcd"[..]));
        assert_eq!(plan.rest(), &[&b"efgh"[..], &b"ij"[..]]);
        assert!(!plan.is_single());

        let plan = ChunkPlan::new(b"ab", 4).unwrap();
        assert!(plan.is_single());
        assert!(plan.rest().is_empty());
    }

    proptest! {
        #[test]
        fn split_then_reassemble_is_identity(
            payload in proptest::collection::vec(any::<u8>(), 0..10_000),
            chunk_size in 1usize..3000,
        ) {
            let chunks = split(&payload, chunk_size).unwrap();
            prop_assert_eq!(reassemble(&chunks), payload.clone());
            prop_assert_eq!(chunks.len() as u32, chunk_count(payload.len(), chunk_size).unwrap());
            // Only the last chunk may be short
            if let Some((_, body)) = chunks.split_last() {
                prop_assert!(body.iter().all(|c| c.len() == chunk_size));
            }
        }
    }
}
