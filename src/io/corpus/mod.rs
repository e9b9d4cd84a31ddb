//! Streaming corpus reader
//!
//! Two-phase design: opening a file runs a single indexing pass that maps
//! every sequence to its byte range and groups sequences into chunks; the
//! decode phase then materialises whole chunks on demand, through a bounded
//! cache, without ever holding more than one buffer of raw text in memory.
//!
//! The randomizer driving the reader asks for chunk descriptions up front,
//! then for specific chunks, then for individual sequences of a resident
//! chunk. Sequence data is handed out as shared handles that keep their
//! chunk alive across cache eviction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::diag::Diagnostics;
use crate::error::{Result, TextFeedError};
use crate::io::corpus::cache::ChunkCache;
use crate::io::corpus::index::CorpusIndex;
use crate::io::window::FileWindow;
use crate::io::{with_retry, INDEX_DELIMITER, NAME_PREFIX, VALUE_DELIMITER};
use crate::types::{ChunkDescriptor, Element, SequenceDescriptor, StreamDescriptor, TraceLevel};

mod cache;
mod chunk;
mod index;
mod parser;

pub use chunk::{ChunkHandle, DenseSequenceData, SequenceData, SparseSequenceData};

/// Configuration of a [`CorpusReader`]
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Diagnostic verbosity (default: [`TraceLevel::Error`])
    pub trace_level: TraceLevel,
    /// Soft parse anomalies tolerated before the reader fails (default: 0)
    pub max_allowed_errors: usize,
    /// Target chunk granule in bytes; `u64::MAX` forces a single chunk
    /// (default: 32 MiB)
    pub chunk_size_bytes: u64,
    /// Decoded chunks kept resident; 0 disables caching (default: 32)
    pub chunk_cache_size: usize,
    /// Treat every row as its own sequence even if the file carries ids
    /// (default: false)
    pub skip_sequence_ids: bool,
    /// Bounded retry for transient I/O failures (default: 5)
    pub num_retries: u32,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            trace_level: TraceLevel::Error,
            max_allowed_errors: 0,
            chunk_size_bytes: 32 * 1024 * 1024,
            chunk_cache_size: 32,
            skip_sequence_ids: false,
            num_retries: 5,
        }
    }
}

/// Streaming reader for line-oriented training corpora
///
/// Rows hold `|`-prefixed samples for named input streams; sequences are
/// either single rows or runs of rows sharing a leading sequence id. The
/// reader scales to files larger than memory: random access goes through a
/// byte-offset index built once at open time.
///
/// # Example
///
/// ```no_run
/// use textfeed::{CorpusReader, ReaderOptions, StreamDescriptor};
///
/// # fn main() -> textfeed::Result<()> {
/// let streams = vec![
///     StreamDescriptor::dense("features", "x", 3),
///     StreamDescriptor::sparse("labels", "y", 10_000),
/// ];
/// let mut reader: CorpusReader<f32> =
///     CorpusReader::open("train.txt", streams, ReaderOptions::default())?;
///
/// for description in reader.chunk_descriptions() {
///     let chunk = reader.get_chunk(description.id)?;
///     for sequence_id in chunk.sequence_ids().collect::<Vec<_>>() {
///         let data = chunk.get_sequence(sequence_id)?;
///         // hand the per-stream data to the randomizer
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct CorpusReader<T: Element> {
    window: FileWindow,
    streams: Arc<[StreamDescriptor]>,
    alias_to_id: HashMap<Vec<u8>, usize>,
    max_alias_length: usize,
    /// Reused alias scan buffer
    scratch: Vec<u8>,
    index: CorpusIndex,
    cache: ChunkCache<T>,
    diag: Diagnostics,
    num_retries: u32,
    /// Whether decode skips id verification; reassigned from the index
    skip_sequence_ids: bool,
}

impl<T: Element> CorpusReader<T> {
    /// Open a corpus file: validate the declared streams, reject a UTF-16
    /// byte-order mark, and run the indexing pass.
    ///
    /// Opening and indexing retry transient I/O failures up to
    /// `num_retries` times.
    pub fn open<P: AsRef<Path>>(
        path: P,
        streams: Vec<StreamDescriptor>,
        options: ReaderOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path.display().to_string();

        validate_streams(&streams)?;

        let mut alias_to_id = HashMap::with_capacity(streams.len());
        let mut max_alias_length = 0;
        for (i, stream) in streams.iter().enumerate() {
            max_alias_length = max_alias_length.max(stream.alias.len());
            alias_to_id.insert(stream.alias.clone().into_bytes(), i);
        }

        let mut window = with_retry(options.num_retries, || {
            FileWindow::open(path).map_err(TextFeedError::from)
        })?;

        window.seek(0)?;
        let payload_start = match window.buffered() {
            [0xFF, 0xFE, ..] | [0xFE, 0xFF, ..] => {
                return Err(TextFeedError::Utf16Bom { file: file_name });
            }
            // a UTF-8 BOM is tolerated and skipped
            [0xEF, 0xBB, 0xBF, ..] => 3,
            _ => 0,
        };

        let index = with_retry(options.num_retries, || {
            window.seek(payload_start)?;
            CorpusIndex::build(
                &mut window,
                &file_name,
                options.skip_sequence_ids,
                options.chunk_size_bytes,
            )
        })?;

        // the file itself is the authority on whether rows carry ids
        let skip_sequence_ids = !index.has_sequence_ids;

        Ok(Self {
            window,
            streams: streams.into(),
            alias_to_id,
            max_alias_length,
            scratch: Vec::with_capacity(max_alias_length),
            index,
            cache: ChunkCache::new(options.chunk_cache_size),
            diag: Diagnostics::new(file_name, options.trace_level, options.max_allowed_errors),
            num_retries: options.num_retries,
            skip_sequence_ids,
        })
    }

    /// The streams declared at construction, in stream-index order.
    pub fn stream_descriptions(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    /// Descriptors of every indexed chunk, in chunk-id order.
    pub fn chunk_descriptions(&self) -> Vec<ChunkDescriptor> {
        self.index
            .chunks
            .iter()
            .map(|chunk| chunk.descriptor)
            .collect()
    }

    /// A copy of one chunk's sequence descriptors, in file order.
    pub fn sequences_for_chunk(&self, chunk_id: u32) -> Result<Vec<SequenceDescriptor>> {
        self.index
            .chunks
            .get(chunk_id as usize)
            .map(|chunk| chunk.sequences.clone())
            .ok_or(TextFeedError::UnknownChunk { id: chunk_id })
    }

    /// Whether decoding verifies an embedded sequence id per sequence.
    pub fn has_sequence_ids(&self) -> bool {
        !self.skip_sequence_ids
    }

    /// Fetch a chunk: from the cache when resident, decoding it otherwise.
    ///
    /// Decoding a chunk may spend the error budget on soft parse anomalies;
    /// once the budget is exhausted the reader fails for good.
    pub fn get_chunk(&mut self, chunk_id: u32) -> Result<ChunkHandle<T>> {
        if let Some(chunk) = self.cache.get(chunk_id) {
            return Ok(chunk);
        }

        match self.decode_chunk(chunk_id) {
            Ok(chunk) => {
                self.cache.insert(chunk_id, chunk.clone());
                Ok(chunk)
            }
            Err(error) => {
                self.diag.warning_notification();
                Err(error)
            }
        }
    }

    fn decode_chunk(&mut self, chunk_id: u32) -> Result<ChunkHandle<T>> {
        if chunk_id as usize >= self.index.chunks.len() {
            return Err(TextFeedError::UnknownChunk { id: chunk_id });
        }
        let retries = self.num_retries;
        let chunk = with_retry(retries, || self.load_chunk(chunk_id))?;
        Ok(ChunkHandle::new(chunk))
    }
}

impl<T: Element> Drop for CorpusReader<T> {
    fn drop(&mut self) {
        // emit the deferred warning summary, if any
        self.diag.warning_notification();
    }
}

fn validate_streams(streams: &[StreamDescriptor]) -> Result<()> {
    if streams.is_empty() {
        return Err(TextFeedError::InvalidStreamConfig {
            msg: "at least one input stream must be declared".to_string(),
        });
    }

    let mut seen = HashMap::with_capacity(streams.len());
    for stream in streams {
        if stream.sample_dimension == 0 {
            return Err(TextFeedError::InvalidStreamConfig {
                msg: format!("stream '{}' declares a zero sample dimension", stream.name),
            });
        }
        if stream.alias.is_empty() {
            return Err(TextFeedError::InvalidStreamConfig {
                msg: format!("stream '{}' declares an empty alias", stream.name),
            });
        }
        if stream
            .alias
            .bytes()
            .any(|b| b <= VALUE_DELIMITER || b == NAME_PREFIX || b == INDEX_DELIMITER)
        {
            return Err(TextFeedError::InvalidStreamConfig {
                msg: format!(
                    "stream '{}' has an alias ('{}') containing reserved characters",
                    stream.name, stream.alias
                ),
            });
        }
        if let Some(previous) = seen.insert(stream.alias.as_str(), stream.name.as_str()) {
            return Err(TextFeedError::InvalidStreamConfig {
                msg: format!(
                    "streams '{}' and '{}' share the alias '{}'",
                    previous, stream.name, stream.alias
                ),
            });
        }
    }
    Ok(())
}
