//! textfeed: streaming text-format corpus reader for training pipelines
//!
//! # Overview
//!
//! textfeed parses a line-oriented text corpus format into training-example
//! data for downstream consumers (randomizers and minibatch packers). Each
//! row of the input holds `|`-prefixed samples for named input streams;
//! samples are dense vectors of reals or sparse `index:value` lists.
//!
//! ## Key Features
//!
//! - **Streaming**: one fixed 64 KiB window over the file, regardless of
//!   corpus size
//! - **Indexed random access**: a single pass maps every sequence to its
//!   byte range; chunks decode on demand in any order
//! - **Chunk caching**: bounded cache with a fewest-sequences-remaining
//!   eviction rule
//! - **Graceful degradation**: a configurable error budget tolerates
//!   malformed rows and reports corruption deterministically
//!
//! ## Quick Start
//!
//! ```no_run
//! use textfeed::{CorpusReader, ReaderOptions, StreamDescriptor};
//!
//! # fn main() -> textfeed::Result<()> {
//! let streams = vec![
//!     StreamDescriptor::dense("features", "x", 3),
//!     StreamDescriptor::sparse("labels", "y", 10_000),
//! ];
//! let mut reader: CorpusReader<f32> =
//!     CorpusReader::open("train.txt", streams, ReaderOptions::default())?;
//!
//! let chunk = reader.get_chunk(0)?;
//! for sequence_id in chunk.sequence_ids().collect::<Vec<_>>() {
//!     let data = chunk.get_sequence(sequence_id)?;
//!     // one entry per declared stream, dense or sparse
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`io`]: byte window, numeric scanners, indexer, and the corpus reader
//! - [`types`]: stream/sequence/chunk descriptors and the element trait
//! - [`error`]: error taxonomy

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod diag;
pub mod error;
pub mod io;
pub mod types;

// Re-export commonly used types
pub use error::{Result, TextFeedError};
pub use io::corpus::{
    ChunkHandle, CorpusReader, DenseSequenceData, ReaderOptions, SequenceData, SparseSequenceData,
};
pub use types::{
    ChunkDescriptor, Element, SequenceDescriptor, StorageKind, StreamDescriptor, TraceLevel,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
