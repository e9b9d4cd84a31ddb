//! Common types used throughout textfeed

use std::fmt;

/// How a stream's samples are laid out in the file and in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Fixed-length vector of reals per sample; short samples are zero-padded
    Dense,
    /// List of `index:value` pairs per sample; empty samples are legal
    Sparse,
}

/// A named input stream declared at construction
///
/// Immutable for the reader's lifetime. The `alias` is the short ASCII tag
/// that appears in the file after the `|` name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// Display identifier used in diagnostics
    pub name: String,
    /// Short ASCII tag appearing in the file after the name prefix
    pub alias: String,
    /// Dense or sparse layout
    pub storage: StorageKind,
    /// Number of elements per sample (>= 1)
    pub sample_dimension: usize,
}

impl StreamDescriptor {
    /// Declare a dense stream
    pub fn dense(name: &str, alias: &str, sample_dimension: usize) -> Self {
        Self {
            name: name.to_string(),
            alias: alias.to_string(),
            storage: StorageKind::Dense,
            sample_dimension,
        }
    }

    /// Declare a sparse stream
    pub fn sparse(name: &str, alias: &str, sample_dimension: usize) -> Self {
        Self {
            name: name.to_string(),
            alias: alias.to_string(),
            storage: StorageKind::Sparse,
            sample_dimension,
        }
    }
}

/// One indexed sequence: a byte range of the input file holding
/// `number_of_samples` rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceDescriptor {
    /// Sequence id, unique within the file
    pub id: u64,
    /// Corpus key parsed from the file, when the file carries ids
    pub key: Option<u64>,
    /// Chunk this sequence was grouped into
    pub chunk_id: u32,
    /// Absolute byte offset of the sequence's first row
    pub file_offset_bytes: u64,
    /// Length of the sequence's byte range, row delimiters included
    pub byte_size: u64,
    /// Number of rows in the sequence
    pub number_of_samples: usize,
    /// Whether the indexer considered the sequence usable
    pub is_valid: bool,
}

/// One indexed chunk: a contiguous run of sequences loaded and cached
/// as a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Chunk id, dense in `[0..number_of_chunks)`
    pub id: u32,
    /// Number of sequences grouped into the chunk
    pub number_of_sequences: usize,
    /// Total row count across the chunk's sequences
    pub number_of_samples: usize,
}

/// Verbosity of the reader's diagnostics
///
/// Ordered: `Error < Warning < Info`. Warnings are emitted only at
/// `Warning` or above; per-sequence completion traces only at `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TraceLevel {
    /// Fatal messages only
    #[default]
    Error,
    /// Parse anomalies as they happen
    Warning,
    /// Per-sequence progress traces
    Info,
}

/// Floating-point element types a corpus can be decoded into
///
/// Values are accumulated in `f64` by the scanners and converted once at
/// emit, so `f32` decoding matches the original single-precision readers.
pub trait Element: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Convert the scanner's `f64` accumulator into the element type
    fn from_f64(value: f64) -> Self;

    /// Widen back to `f64` for generic comparisons
    fn to_f64(self) -> f64;
}

impl Element for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Element for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_levels_are_ordered() {
        assert!(TraceLevel::Error < TraceLevel::Warning);
        assert!(TraceLevel::Warning < TraceLevel::Info);
        assert_eq!(TraceLevel::default(), TraceLevel::Error);
    }

    #[test]
    fn stream_descriptor_helpers() {
        let s = StreamDescriptor::dense("features", "x", 3);
        assert_eq!(s.storage, StorageKind::Dense);
        assert_eq!(s.sample_dimension, 3);

        let s = StreamDescriptor::sparse("labels", "y", 10);
        assert_eq!(s.storage, StorageKind::Sparse);
        assert_eq!(s.alias, "y");
    }
}
