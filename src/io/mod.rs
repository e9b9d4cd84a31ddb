//! I/O module: byte window, numeric scanners, and the corpus reader
//!
//! Decoding works off a single fixed-size window over the file, so memory
//! stays constant regardless of corpus size. The significant bytes of the
//! format are defined here; everything else on a row is payload.

use log::warn;

use crate::error::Result;

pub mod corpus;
pub(crate) mod scan;
pub(crate) mod window;

pub use corpus::{
    ChunkHandle, CorpusReader, DenseSequenceData, ReaderOptions, SequenceData, SparseSequenceData,
};

/// Ends a row
pub(crate) const ROW_DELIMITER: u8 = b'\n';
/// Benign wherever it appears
pub(crate) const CARRIAGE_RETURN: u8 = b'\r';
/// Benign inter-token separator
pub(crate) const COLUMN_DELIMITER: u8 = b'\t';
/// Benign inter-token separator
pub(crate) const VALUE_DELIMITER: u8 = b' ';
/// Introduces a sample
pub(crate) const NAME_PREFIX: u8 = b'|';
/// Separates index and value in a sparse pair
pub(crate) const INDEX_DELIMITER: u8 = b':';
/// After a name prefix, skips the rest of the sample
pub(crate) const ESCAPE_SYMBOL: u8 = b'#';

/// Terminators recognised by the unsigned-integer scanner.
pub(crate) fn is_delimiter(c: u8) -> bool {
    c == VALUE_DELIMITER
        || c == NAME_PREFIX
        || c == COLUMN_DELIMITER
        || c == INDEX_DELIMITER
        || c == ROW_DELIMITER
        || c == CARRIAGE_RETURN
}

/// Run an operation with a bounded retry on transient I/O failures.
///
/// Applies to open, index build, and chunk load. Parse-level and structural
/// failures are returned immediately; there is no backoff.
pub(crate) fn with_retry<T, F>(retries: u32, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Err(error) if error.is_transient() && attempt < retries => {
                attempt += 1;
                warn!("Transient I/O failure ({error}), retrying ({attempt}/{retries})");
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TextFeedError;

    #[test]
    fn delimiter_set_is_exact() {
        for c in [b' ', b'|', b'\t', b':', b'\n', b'\r'] {
            assert!(is_delimiter(c));
        }
        for c in [b'0', b'a', b'#', b'.', b'-'] {
            assert!(!is_delimiter(c));
        }
    }

    #[test]
    fn retry_gives_up_after_the_cap() {
        let mut calls = 0;
        let result: Result<()> = with_retry(3, || {
            calls += 1;
            Err(TextFeedError::Io(std::io::Error::other("flaky")))
        });
        assert!(result.is_err());
        assert_eq!(calls, 4);
    }

    #[test]
    fn retry_does_not_apply_to_parse_failures() {
        let mut calls = 0;
        let result: Result<()> = with_retry(3, || {
            calls += 1;
            Err(TextFeedError::MalformedInput {
                file: "x".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn retry_returns_first_success() {
        let mut calls = 0;
        let result = with_retry(5, || {
            calls += 1;
            if calls < 3 {
                Err(TextFeedError::Io(std::io::Error::other("flaky")))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }
}
