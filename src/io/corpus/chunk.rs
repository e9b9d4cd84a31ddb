//! Decoded chunks and the sequence-data handles emitted to consumers
//!
//! A decoded chunk maps sequence ids to per-stream buffers. The loader
//! mutates it until the cache insert; afterwards it is read-only. Emitted
//! sequence-data handles share ownership of the chunk through `Arc`, so
//! eviction only drops the cache's reference and in-flight consumers keep
//! the chunk alive until their handles drop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Result, TextFeedError};
use crate::types::{Element, StreamDescriptor};

/// Growable buffer for one dense stream of one sequence
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DenseBuffer<T: Element> {
    /// `number_of_samples * sample_dimension` elements
    pub(crate) values: Vec<T>,
    /// Full samples appended so far
    pub(crate) number_of_samples: usize,
}

impl<T: Element> DenseBuffer<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            number_of_samples: 0,
        }
    }
}

/// Growable buffers for one sparse stream of one sequence
///
/// Invariant: `values.len() == indices.len() == sum(nnz_counts) == total_nnz`
/// and `nnz_counts.len() == number_of_samples`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SparseBuffer<T: Element> {
    pub(crate) values: Vec<T>,
    pub(crate) indices: Vec<u32>,
    /// Non-zero count of each sample, in sample order
    pub(crate) nnz_counts: Vec<usize>,
    pub(crate) total_nnz: usize,
    pub(crate) number_of_samples: usize,
}

impl<T: Element> Default for SparseBuffer<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            indices: Vec::new(),
            nnz_counts: Vec::new(),
            total_nnz: 0,
            number_of_samples: 0,
        }
    }
}

/// Per-stream buffer, dispatched by the stream's storage kind
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InputBuffer<T: Element> {
    Dense(DenseBuffer<T>),
    Sparse(SparseBuffer<T>),
}

impl<T: Element> InputBuffer<T> {
    pub(crate) fn number_of_samples(&self) -> usize {
        match self {
            InputBuffer::Dense(buffer) => buffer.number_of_samples,
            InputBuffer::Sparse(buffer) => buffer.number_of_samples,
        }
    }
}

/// All buffers of one decoded sequence, ordered by stream index
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SequenceBuffer<T: Element> {
    pub(crate) inputs: Vec<InputBuffer<T>>,
}

/// One fully decoded chunk
#[derive(Debug)]
pub(crate) struct DecodedChunk<T: Element> {
    pub(crate) id: u32,
    pub(crate) sequences: BTreeMap<u64, SequenceBuffer<T>>,
    /// How many times a sequence was handed out; drives eviction
    pub(crate) request_count: AtomicUsize,
    pub(crate) streams: Arc<[StreamDescriptor]>,
}

impl<T: Element> DecodedChunk<T> {
    pub(crate) fn new(
        id: u32,
        sequences: BTreeMap<u64, SequenceBuffer<T>>,
        streams: Arc<[StreamDescriptor]>,
    ) -> Self {
        Self {
            id,
            sequences,
            request_count: AtomicUsize::new(0),
            streams,
        }
    }
}

/// Shared handle to a resident decoded chunk
///
/// Cloning is cheap; all clones and all emitted [`SequenceData`] values
/// keep the underlying chunk alive.
#[derive(Debug, Clone)]
pub struct ChunkHandle<T: Element> {
    inner: Arc<DecodedChunk<T>>,
}

impl<T: Element> ChunkHandle<T> {
    pub(crate) fn new(chunk: DecodedChunk<T>) -> Self {
        Self {
            inner: Arc::new(chunk),
        }
    }

    /// Chunk id this handle was loaded for
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// Number of sequences decoded into the chunk
    pub fn number_of_sequences(&self) -> usize {
        self.inner.sequences.len()
    }

    /// Ids of the decoded sequences, in file order
    pub fn sequence_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.inner.sequences.keys().copied()
    }

    /// Hand out one sequence as per-stream data handles, in stream order.
    ///
    /// Each returned handle shares ownership of the chunk. Every call
    /// counts one sequence request toward the cache's eviction heuristic.
    pub fn get_sequence(&self, sequence_id: u64) -> Result<Vec<SequenceData<T>>> {
        let sequence =
            self.inner
                .sequences
                .get(&sequence_id)
                .ok_or(TextFeedError::UnknownSequence {
                    id: sequence_id,
                    chunk: self.inner.id,
                })?;

        self.inner.request_count.fetch_add(1, Ordering::Relaxed);

        let mut result = Vec::with_capacity(sequence.inputs.len());
        for (stream, input) in sequence.inputs.iter().enumerate() {
            result.push(match input {
                InputBuffer::Dense(_) => SequenceData::Dense(DenseSequenceData {
                    chunk: Arc::clone(&self.inner),
                    sequence_id,
                    stream,
                }),
                InputBuffer::Sparse(_) => SequenceData::Sparse(SparseSequenceData {
                    chunk: Arc::clone(&self.inner),
                    sequence_id,
                    stream,
                }),
            });
        }
        Ok(result)
    }

    /// Sequences not yet handed out, per the request counter. The eviction
    /// victim is the resident chunk minimising this.
    pub(crate) fn sequences_remaining(&self) -> usize {
        self.inner
            .sequences
            .len()
            .saturating_sub(self.inner.request_count.load(Ordering::Relaxed))
    }
}

/// Data of one sequence on one stream
#[derive(Debug, Clone)]
pub enum SequenceData<T: Element> {
    /// Dense stream data
    Dense(DenseSequenceData<T>),
    /// Sparse stream data
    Sparse(SparseSequenceData<T>),
}

impl<T: Element> SequenceData<T> {
    /// Number of samples the sequence holds on this stream
    pub fn number_of_samples(&self) -> usize {
        match self {
            SequenceData::Dense(data) => data.number_of_samples(),
            SequenceData::Sparse(data) => data.number_of_samples(),
        }
    }

    /// Id of the sequence this data belongs to
    pub fn sequence_id(&self) -> u64 {
        match self {
            SequenceData::Dense(data) => data.sequence_id(),
            SequenceData::Sparse(data) => data.sequence_id(),
        }
    }

    /// Borrow as dense data, if this stream is dense
    pub fn as_dense(&self) -> Option<&DenseSequenceData<T>> {
        match self {
            SequenceData::Dense(data) => Some(data),
            SequenceData::Sparse(_) => None,
        }
    }

    /// Borrow as sparse data, if this stream is sparse
    pub fn as_sparse(&self) -> Option<&SparseSequenceData<T>> {
        match self {
            SequenceData::Sparse(data) => Some(data),
            SequenceData::Dense(_) => None,
        }
    }
}

/// Dense sequence data: a flat run of `number_of_samples * sample_dimension`
/// elements
#[derive(Debug, Clone)]
pub struct DenseSequenceData<T: Element> {
    chunk: Arc<DecodedChunk<T>>,
    sequence_id: u64,
    stream: usize,
}

impl<T: Element> DenseSequenceData<T> {
    fn buffer(&self) -> &DenseBuffer<T> {
        match &self.chunk.sequences[&self.sequence_id].inputs[self.stream] {
            InputBuffer::Dense(buffer) => buffer,
            InputBuffer::Sparse(_) => unreachable!("dense handle built from a dense input"),
        }
    }

    /// The decoded elements, sample-major
    pub fn values(&self) -> &[T] {
        &self.buffer().values
    }

    /// Number of samples in this sequence
    pub fn number_of_samples(&self) -> usize {
        self.buffer().number_of_samples
    }

    /// Declared per-sample dimension of the stream
    pub fn sample_dimension(&self) -> usize {
        self.chunk.streams[self.stream].sample_dimension
    }

    /// Display name of the stream
    pub fn stream_name(&self) -> &str {
        &self.chunk.streams[self.stream].name
    }

    /// Id of the sequence this data belongs to
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }
}

/// Sparse sequence data: parallel value/index runs plus per-sample non-zero
/// counts
#[derive(Debug, Clone)]
pub struct SparseSequenceData<T: Element> {
    chunk: Arc<DecodedChunk<T>>,
    sequence_id: u64,
    stream: usize,
}

impl<T: Element> SparseSequenceData<T> {
    fn buffer(&self) -> &SparseBuffer<T> {
        match &self.chunk.sequences[&self.sequence_id].inputs[self.stream] {
            InputBuffer::Sparse(buffer) => buffer,
            InputBuffer::Dense(_) => unreachable!("sparse handle built from a sparse input"),
        }
    }

    /// Non-zero values across all samples, in sample order
    pub fn values(&self) -> &[T] {
        &self.buffer().values
    }

    /// Element index of each value within its sample
    pub fn indices(&self) -> &[u32] {
        &self.buffer().indices
    }

    /// Non-zero count of each sample
    pub fn nnz_counts(&self) -> &[usize] {
        &self.buffer().nnz_counts
    }

    /// Total non-zero count across the sequence
    pub fn total_nnz(&self) -> usize {
        self.buffer().total_nnz
    }

    /// Number of samples in this sequence
    pub fn number_of_samples(&self) -> usize {
        self.buffer().number_of_samples
    }

    /// Declared per-sample dimension of the stream
    pub fn sample_dimension(&self) -> usize {
        self.chunk.streams[self.stream].sample_dimension
    }

    /// Display name of the stream
    pub fn stream_name(&self) -> &str {
        &self.chunk.streams[self.stream].name
    }

    /// Id of the sequence this data belongs to
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }
}
