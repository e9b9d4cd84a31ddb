//! Bounded cache of decoded chunks
//!
//! Eviction is not recency-based: the victim is the resident chunk with the
//! fewest sequences left to serve (`number_of_sequences` minus the chunk's
//! request counter), so drained chunks make room while hot ones stay
//! resident. Ties go to the lowest chunk id. A capacity of 0 disables
//! caching entirely and every request decodes afresh.

use std::collections::BTreeMap;

use crate::io::corpus::chunk::ChunkHandle;
use crate::types::Element;

pub(crate) struct ChunkCache<T: Element> {
    capacity: usize,
    chunks: BTreeMap<u32, ChunkHandle<T>>,
}

impl<T: Element> ChunkCache<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            chunks: BTreeMap::new(),
        }
    }

    pub(crate) fn get(&self, chunk_id: u32) -> Option<ChunkHandle<T>> {
        self.chunks.get(&chunk_id).cloned()
    }

    /// Insert a freshly decoded chunk, evicting first when full.
    pub(crate) fn insert(&mut self, chunk_id: u32, chunk: ChunkHandle<T>) {
        if self.capacity == 0 {
            return;
        }

        if self.chunks.len() == self.capacity {
            let mut victim = None;
            let mut min_sequences_left = usize::MAX;
            for (&id, resident) in &self.chunks {
                let sequences_left = resident.sequences_remaining();
                if sequences_left < min_sequences_left {
                    min_sequences_left = sequences_left;
                    victim = Some(id);
                }
            }
            if let Some(id) = victim {
                self.chunks.remove(&id);
            }
        }

        self.chunks.insert(chunk_id, chunk);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.chunks.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, chunk_id: u32) -> bool {
        self.chunks.contains_key(&chunk_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::corpus::chunk::{
        DecodedChunk, DenseBuffer, InputBuffer, SequenceBuffer,
    };
    use crate::types::StreamDescriptor;
    use std::collections::BTreeMap as SequenceMap;
    use std::sync::Arc;

    /// Chunk with `sequences` single-sample sequences, ids starting at
    /// `first_id`.
    fn chunk_with(id: u32, first_id: u64, sequences: usize) -> ChunkHandle<f32> {
        let streams: Arc<[StreamDescriptor]> =
            vec![StreamDescriptor::dense("features", "x", 1)].into();
        let mut map = SequenceMap::new();
        for i in 0..sequences {
            map.insert(
                first_id + i as u64,
                SequenceBuffer {
                    inputs: vec![InputBuffer::Dense(DenseBuffer {
                        values: vec![0.0],
                        number_of_samples: 1,
                    })],
                },
            );
        }
        ChunkHandle::new(DecodedChunk::new(id, map, streams))
    }

    #[test]
    fn zero_capacity_never_stores() {
        let mut cache: ChunkCache<f32> = ChunkCache::new(0);
        cache.insert(0, chunk_with(0, 0, 1));
        assert_eq!(cache.len(), 0);
        assert!(cache.get(0).is_none());
    }

    #[test]
    fn evicts_the_most_drained_chunk() {
        let mut cache: ChunkCache<f32> = ChunkCache::new(2);

        let drained = chunk_with(0, 0, 2);
        for id in drained.sequence_ids().collect::<Vec<_>>() {
            let _ = drained.get_sequence(id).unwrap();
        }
        cache.insert(0, drained);
        cache.insert(1, chunk_with(1, 10, 2)); // untouched, 2 remaining

        cache.insert(2, chunk_with(2, 20, 2));

        assert!(!cache.contains(0), "drained chunk should be the victim");
        assert!(cache.contains(1));
        assert!(cache.contains(2));
    }

    #[test]
    fn ties_evict_the_lowest_id() {
        let mut cache: ChunkCache<f32> = ChunkCache::new(2);
        cache.insert(3, chunk_with(3, 0, 1));
        cache.insert(5, chunk_with(5, 10, 1));

        cache.insert(7, chunk_with(7, 20, 1));

        assert!(!cache.contains(3));
        assert!(cache.contains(5));
        assert!(cache.contains(7));
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut cache: ChunkCache<f32> = ChunkCache::new(3);
        for id in 0..10u32 {
            cache.insert(id, chunk_with(id, u64::from(id) * 10, 1));
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
    }
}
