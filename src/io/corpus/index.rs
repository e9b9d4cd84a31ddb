//! First-pass corpus indexer
//!
//! One sequential scan over the payload produces every sequence's byte
//! range and row count, grouped into chunks of a configured target byte
//! size. The decoder later seeks straight to a sequence's range and never
//! reads past it.
//!
//! Whether the file carries explicit sequence ids is decided by the first
//! payload byte: a row starting with the `|` name prefix means rows have no
//! id column and every row is its own sequence. Otherwise every row must
//! begin with an id, and a maximal run of consecutive rows sharing one id
//! forms a sequence.

use crate::error::{Result, TextFeedError};
use crate::io::window::FileWindow;
use crate::io::{CARRIAGE_RETURN, NAME_PREFIX, ROW_DELIMITER};
use crate::types::{ChunkDescriptor, SequenceDescriptor};

/// Index of a corpus file: chunk descriptors plus per-chunk sequence lists
#[derive(Debug, Clone)]
pub(crate) struct CorpusIndex {
    pub(crate) chunks: Vec<IndexedChunk>,
    /// Whether rows carry an explicit sequence-id column
    pub(crate) has_sequence_ids: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct IndexedChunk {
    pub(crate) descriptor: ChunkDescriptor,
    /// Ordered by file offset; byte ranges are contiguous and disjoint
    pub(crate) sequences: Vec<SequenceDescriptor>,
}

impl CorpusIndex {
    /// Scan the payload (the window must be positioned at its start) and
    /// build the index.
    pub(crate) fn build(
        window: &mut FileWindow,
        file: &str,
        skip_sequence_ids: bool,
        chunk_size_bytes: u64,
    ) -> Result<Self> {
        let mut has_sequence_ids = None;
        let mut builder = IndexBuilder::default();

        while window.can_read()? {
            let row_start = window.file_offset();

            // payload-less rows (optional carriage returns, then the row
            // delimiter) carry no samples: their bytes are attached to the
            // preceding sequence and they count no row
            while window.can_read()? && window.peek() == CARRIAGE_RETURN {
                window.advance();
            }
            if !window.can_read()? {
                builder.attach_blank(window.file_offset() - row_start, false);
                break;
            }
            if window.peek() == ROW_DELIMITER {
                window.advance();
                // inside an id run a blank line is still one of the
                // sequence's rows (the decoder charges it as an anomaly);
                // between single-row sequences it is just skipped bytes
                builder.attach_blank(
                    window.file_offset() - row_start,
                    has_sequence_ids == Some(true),
                );
                continue;
            }

            let has_ids = *has_sequence_ids
                .get_or_insert(!skip_sequence_ids && window.peek() != NAME_PREFIX);
            let key = if has_ids {
                Some(read_row_id(window, file)?)
            } else {
                None
            };

            while window.can_read()? {
                let c = window.peek();
                window.advance();
                if c == ROW_DELIMITER {
                    break;
                }
            }

            builder.add_row(key, row_start, window.file_offset() - row_start);
        }

        if builder.sequences.is_empty() {
            return Err(TextFeedError::EmptyInput {
                file: file.to_string(),
            });
        }

        Ok(builder.finish(has_sequence_ids.unwrap_or(false), chunk_size_bytes))
    }
}

/// Read the digit run opening a row. The terminator is left unconsumed.
fn read_row_id(window: &mut FileWindow, file: &str) -> Result<u64> {
    let row_offset = window.file_offset();
    let mut value: u64 = 0;
    let mut found = false;

    while window.can_read()? {
        let c = window.peek();
        if !c.is_ascii_digit() {
            break;
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(c - b'0')))
            .ok_or(TextFeedError::InvalidSequenceId {
                offset: row_offset,
                file: file.to_string(),
            })?;
        found = true;
        window.advance();
    }

    if !found {
        return Err(TextFeedError::InvalidSequenceId {
            offset: row_offset,
            file: file.to_string(),
        });
    }
    Ok(value)
}

#[derive(Default)]
struct IndexBuilder {
    sequences: Vec<SequenceDescriptor>,
    next_ordinal: u64,
}

impl IndexBuilder {
    /// Fold a payload-less row's bytes into the preceding sequence's range
    /// so they stay inside its decode budget. Leading blanks have no home
    /// and are simply not covered by any range.
    fn attach_blank(&mut self, byte_size: u64, count_row: bool) {
        if let Some(last) = self.sequences.last_mut() {
            last.byte_size += byte_size;
            if count_row {
                last.number_of_samples += 1;
            }
        }
    }

    fn add_row(&mut self, key: Option<u64>, offset: u64, byte_size: u64) {
        if let (Some(id), Some(last)) = (key, self.sequences.last_mut()) {
            if last.key == Some(id) {
                last.byte_size += byte_size;
                last.number_of_samples += 1;
                return;
            }
        }

        let id = key.unwrap_or(self.next_ordinal);
        self.next_ordinal += 1;
        self.sequences.push(SequenceDescriptor {
            id,
            key,
            chunk_id: 0,
            file_offset_bytes: offset,
            byte_size,
            number_of_samples: 1,
            is_valid: true,
        });
    }

    /// Group sequences into chunks: a chunk closes once its cumulative byte
    /// size first reaches the target. Boundaries are always sequence ends.
    fn finish(self, has_sequence_ids: bool, chunk_size_bytes: u64) -> CorpusIndex {
        let mut chunks: Vec<IndexedChunk> = Vec::new();
        let mut current: Vec<SequenceDescriptor> = Vec::new();
        let mut current_bytes: u64 = 0;

        for mut sequence in self.sequences {
            sequence.chunk_id = chunks.len() as u32;
            current_bytes += sequence.byte_size;
            current.push(sequence);
            if current_bytes >= chunk_size_bytes {
                chunks.push(seal_chunk(chunks.len() as u32, std::mem::take(&mut current)));
                current_bytes = 0;
            }
        }
        if !current.is_empty() {
            chunks.push(seal_chunk(chunks.len() as u32, current));
        }

        CorpusIndex {
            chunks,
            has_sequence_ids,
        }
    }
}

fn seal_chunk(id: u32, sequences: Vec<SequenceDescriptor>) -> IndexedChunk {
    let number_of_samples = sequences.iter().map(|s| s.number_of_samples).sum();
    IndexedChunk {
        descriptor: ChunkDescriptor {
            id,
            number_of_sequences: sequences.len(),
            number_of_samples,
        },
        sequences,
    }
}
