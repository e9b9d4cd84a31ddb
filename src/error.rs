//! Error types for textfeed

use thiserror::Error;

/// Result type alias for textfeed operations
pub type Result<T> = std::result::Result<T, TextFeedError>;

/// Error types that can occur while indexing or decoding a corpus file
#[derive(Debug, Error)]
pub enum TextFeedError {
    /// I/O error (open, seek, or read)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input file starts with a UTF-16 byte-order mark
    #[error(
        "Found a UTF-16 BOM at the beginning of the input file ({file}). \
         UTF-16 encoding is currently not supported."
    )]
    Utf16Bom {
        /// Input file name
        file: String,
    },

    /// The input file contains no payload
    #[error("The input file ({file}) is empty.")]
    EmptyInput {
        /// Input file name
        file: String,
    },

    /// The declared stream set failed validation at construction
    #[error("Invalid stream configuration: {msg}")]
    InvalidStreamConfig {
        /// What was wrong with the declared streams
        msg: String,
    },

    /// A row was expected to begin with a sequence id but did not
    #[error("Expected a sequence id at offset {offset} in the input file ({file}).")]
    InvalidSequenceId {
        /// Byte offset of the offending row
        offset: u64,
        /// Input file name
        file: String,
    },

    /// The id embedded in the file does not match the indexed descriptor
    #[error(
        "Did not find the expected sequence (id = {expected}) \
         at offset {offset} in the input file ({file})."
    )]
    SequenceIdMismatch {
        /// Sequence id the index promised
        expected: u64,
        /// Byte offset where the id was read
        offset: u64,
        /// Input file name
        file: String,
    },

    /// A fully decoded sequence left at least one input stream empty
    #[error("Malformed input file ({file}). Bailing out.")]
    MalformedInput {
        /// Input file name
        file: String,
    },

    /// The configured error budget was exhausted
    #[error(
        "Reached the maximum number of allowed errors \
         while reading the input file ({file})."
    )]
    ErrorBudgetExhausted {
        /// Input file name
        file: String,
    },

    /// A chunk id outside the indexed range was requested
    #[error("Chunk id {id} is out of range.")]
    UnknownChunk {
        /// Requested chunk id
        id: u32,
    },

    /// A sequence id not present in the decoded chunk was requested
    #[error("Sequence id {id} is not present in chunk {chunk}.")]
    UnknownSequence {
        /// Requested sequence id
        id: u64,
        /// Chunk the lookup went through
        chunk: u32,
    },
}

impl TextFeedError {
    /// Whether the failure is a transient I/O condition that a bounded
    /// retry may clear. Parse-level and structural failures never are.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, TextFeedError::Io(_))
    }
}
