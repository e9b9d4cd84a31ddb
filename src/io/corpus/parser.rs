//! Row/sample grammar and the chunk loader
//!
//! A chunk is materialised by seeking to each of its sequences in file
//! order and decoding exactly the indexed byte range: every read decrements
//! a per-sequence byte budget, so a corrupt row can never bleed into the
//! next sequence. Parse anomalies are soft: the decoder warns, charges the
//! error budget, resynchronises to the next `|` or end of row, and keeps
//! going until the budget runs dry.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{error, info};

use crate::error::{Result, TextFeedError};
use crate::io::corpus::chunk::{
    DecodedChunk, DenseBuffer, InputBuffer, SequenceBuffer, SparseBuffer,
};
use crate::io::corpus::CorpusReader;
use crate::io::scan;
use crate::io::{
    CARRIAGE_RETURN, COLUMN_DELIMITER, ESCAPE_SYMBOL, INDEX_DELIMITER, NAME_PREFIX, ROW_DELIMITER,
    VALUE_DELIMITER,
};
use crate::types::{Element, SequenceDescriptor, StorageKind, TraceLevel};

impl<T: Element> CorpusReader<T> {
    /// Record a parse anomaly at the current position.
    fn warn<F: FnOnce() -> String>(&mut self, message: F) {
        self.diag.warn_at(self.window.file_offset(), message);
    }

    /// Decode every sequence of a chunk, in file order.
    pub(super) fn load_chunk(&mut self, chunk_id: u32) -> Result<DecodedChunk<T>> {
        let descriptors = self.index.chunks[chunk_id as usize].sequences.clone();
        let verify_id = !self.skip_sequence_ids;

        let mut sequences = BTreeMap::new();
        for descriptor in &descriptors {
            let buffer = self.load_sequence(verify_id, descriptor)?;
            sequences.insert(descriptor.id, buffer);
        }

        Ok(DecodedChunk::new(
            chunk_id,
            sequences,
            Arc::clone(&self.streams),
        ))
    }

    fn load_sequence(
        &mut self,
        verify_id: bool,
        descriptor: &SequenceDescriptor,
    ) -> Result<SequenceBuffer<T>> {
        self.window.position_at(descriptor.file_offset_bytes)?;
        let mut bytes_to_read = descriptor.byte_size as usize;

        if verify_id {
            let offset = self.window.file_offset();
            let id = scan::read_u64(&mut self.window, &mut bytes_to_read, &mut self.diag)?;
            if id != Some(descriptor.id) {
                self.diag.warning_notification();
                return Err(TextFeedError::SequenceIdMismatch {
                    expected: descriptor.id,
                    offset,
                    file: self.diag.file().to_string(),
                });
            }
        }

        let mut sequence = SequenceBuffer {
            inputs: self
                .streams
                .iter()
                .map(|stream| match stream.storage {
                    StorageKind::Dense => InputBuffer::Dense(DenseBuffer::with_capacity(
                        stream.sample_dimension * descriptor.number_of_samples,
                    )),
                    StorageKind::Sparse => InputBuffer::Sparse(SparseBuffer::default()),
                })
                .collect(),
        };

        let expected_rows = descriptor.number_of_samples;
        let mut rows_read = 0usize;
        for row in 0..expected_rows {
            if self.read_row(&mut sequence, &mut bytes_to_read)? {
                rows_read += 1;
            } else {
                self.diag.count_error()?;
                self.warn(|| {
                    format!(
                        "Could not read a row (# {}) while loading sequence (id = {})",
                        row + 1,
                        descriptor.id
                    )
                });
            }

            if bytes_to_read == 0 && rows_read < expected_rows {
                self.warn(|| {
                    format!(
                        "Exhausted all input expected for the current sequence (id = {}), \
                         but only read {} out of {} expected rows",
                        descriptor.id, rows_read, expected_rows
                    )
                });
                break;
            }
        }

        let mut has_empty_inputs = false;
        let mut has_overfull_inputs = false;
        for (i, input) in sequence.inputs.iter().enumerate() {
            if input.number_of_samples() == 0 {
                error!(
                    "Input ('{}') is empty in sequence (id = {}) in the input file ({}).",
                    self.streams[i].name,
                    descriptor.id,
                    self.diag.file()
                );
                has_empty_inputs = true;
            }

            if input.number_of_samples() > expected_rows {
                has_overfull_inputs = true;
                let name = self.streams[i].name.clone();
                let count = input.number_of_samples();
                self.warn(move || {
                    format!(
                        "Input ('{}') contains more samples than expected ({} vs. {}) \
                         for sequence (id = {})",
                        name, count, expected_rows, descriptor.id
                    )
                });
            }
        }

        if has_empty_inputs {
            self.diag.warning_notification();
            return Err(TextFeedError::MalformedInput {
                file: self.diag.file().to_string(),
            });
        }

        if has_overfull_inputs {
            self.diag.count_error()?;
        }

        if self.diag.trace_level() >= TraceLevel::Info {
            info!(
                "Finished loading sequence (id = {}) from the input file ({}), \
                 successfully read {} out of {} expected rows.",
                descriptor.id,
                self.diag.file(),
                rows_read,
                expected_rows
            );
        }

        Ok(sequence)
    }

    /// Decode one row into the sequence's buffers. Returns whether any
    /// sample was read.
    fn read_row(
        &mut self,
        sequence: &mut SequenceBuffer<T>,
        bytes_to_read: &mut usize,
    ) -> Result<bool> {
        // skip a repeated sequence-id prefix
        while *bytes_to_read > 0 && self.window.can_read()? && self.window.peek().is_ascii_digit()
        {
            self.window.advance();
            *bytes_to_read -= 1;
        }

        let mut samples_read = 0usize;
        while *bytes_to_read > 0 && self.window.can_read()? {
            let c = self.window.peek();

            if c == COLUMN_DELIMITER || c == VALUE_DELIMITER || c == CARRIAGE_RETURN {
                self.window.advance();
                *bytes_to_read -= 1;
                continue;
            }

            if c == ROW_DELIMITER {
                self.window.advance();
                *bytes_to_read -= 1;

                if samples_read == 0 {
                    self.warn(|| "Empty input row".to_string());
                } else if samples_read > self.streams.len() {
                    let declared = self.streams.len();
                    self.warn(|| {
                        format!(
                            "Input row contains more samples than expected ({samples_read} \
                             vs. {declared})"
                        )
                    });
                }

                return Ok(samples_read > 0);
            }

            if self.read_sample(sequence, bytes_to_read)? {
                samples_read += 1;
            } else {
                self.skip_to_next_input(bytes_to_read)?;
            }
        }

        // ran out of the sequence's bytes before a row delimiter
        self.warn(|| {
            "Exhausted all input expected for the current sequence while reading an \
             input row; possibly, a trailing newline is missing"
                .to_string()
        });
        if samples_read > 0 {
            // the parsed samples stand, at the cost of one budgeted error
            self.diag.count_error()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Decode one `|`-prefixed sample into its stream's buffer.
    fn read_sample(
        &mut self,
        sequence: &mut SequenceBuffer<T>,
        bytes_to_read: &mut usize,
    ) -> Result<bool> {
        let c = self.window.peek();
        if c != NAME_PREFIX {
            self.warn(|| {
                format!(
                    "Unexpected character ('{}') in place of a name prefix ('|') \
                     in an input name",
                    c as char
                )
            });
            self.diag.count_error()?;
            return Ok(false);
        }

        self.window.advance();
        *bytes_to_read -= 1;

        // "|#" starts an escape: the rest of the sample is legally ignored
        if *bytes_to_read > 0 && self.window.can_read()? && self.window.peek() == ESCAPE_SYMBOL {
            self.window.advance();
            *bytes_to_read -= 1;
            return Ok(false);
        }

        let stream_id = match self.read_alias(bytes_to_read)? {
            Some(id) => id,
            None => {
                self.diag.count_error()?;
                return Ok(false);
            }
        };

        let sample_dimension = self.streams[stream_id].sample_dimension;
        match &mut sequence.inputs[stream_id] {
            InputBuffer::Dense(buffer) => {
                let size = buffer.values.len();
                debug_assert_eq!(size % sample_dimension, 0);
                if !self.read_dense_sample(&mut buffer.values, sample_dimension, bytes_to_read)? {
                    // roll back partial appends
                    buffer.values.truncate(size);
                    self.diag.count_error()?;
                    return Ok(false);
                }
                buffer.number_of_samples += 1;
            }
            InputBuffer::Sparse(buffer) => {
                debug_assert_eq!(buffer.values.len(), buffer.indices.len());
                let size = buffer.values.len();
                self.read_sparse_sample(
                    &mut buffer.values,
                    &mut buffer.indices,
                    sample_dimension,
                    bytes_to_read,
                )?;
                let count = buffer.values.len() - size;
                buffer.number_of_samples += 1;
                buffer.nnz_counts.push(count);
                buffer.total_nnz += count;
            }
        }

        Ok(true)
    }

    /// Read the alias after a name prefix and resolve it to a stream index.
    /// The terminating byte is left unconsumed.
    fn read_alias(&mut self, bytes_to_read: &mut usize) -> Result<Option<usize>> {
        self.scratch.clear();

        while *bytes_to_read > 0 && self.window.can_read()? {
            let c = self.window.peek();

            // an alias ends at any control/space byte, an index delimiter,
            // or the next name prefix
            if c <= VALUE_DELIMITER || c == NAME_PREFIX || c == INDEX_DELIMITER {
                if self.scratch.is_empty() {
                    self.warn(|| {
                        format!(
                            "Input name prefix ('|') is followed by an invalid \
                             character ('{}')",
                            c as char
                        )
                    });
                    return Ok(None);
                }
                if let Some(&id) = self.alias_to_id.get(self.scratch.as_slice()) {
                    return Ok(Some(id));
                }
                let name = String::from_utf8_lossy(&self.scratch).into_owned();
                self.warn(move || format!("Invalid input name ('{name}')"));
                return Ok(None);
            }

            if self.scratch.len() == self.max_alias_length {
                // already as long as the longest declared alias, still no delimiter
                self.warn(|| "Did not find a valid input name".to_string());
                return Ok(None);
            }
            self.scratch.push(c);
            self.window.advance();
            *bytes_to_read -= 1;
        }

        self.warn(|| "Exhausted all input while reading an input name".to_string());
        Ok(None)
    }

    /// Read the values of a dense sample. Short samples are zero-padded to
    /// the declared dimension; oversized samples fail.
    fn read_dense_sample(
        &mut self,
        values: &mut Vec<T>,
        sample_dimension: usize,
        bytes_to_read: &mut usize,
    ) -> Result<bool> {
        let mut counter = 0usize;

        while *bytes_to_read > 0 && self.window.can_read()? {
            let c = self.window.peek();

            // any non-printable byte or the next name prefix ends the sample
            if c < VALUE_DELIMITER || c == NAME_PREFIX {
                break;
            }

            if c == VALUE_DELIMITER {
                self.window.advance();
                *bytes_to_read -= 1;
                continue;
            }

            match scan::read_real::<T>(&mut self.window, bytes_to_read, &mut self.diag)? {
                Some(value) => {
                    values.push(value);
                    counter += 1;
                }
                None => return Ok(false),
            }
        }

        if counter > sample_dimension {
            self.warn(|| {
                format!("Dense sample (size = {counter}) exceeds the expected size \
                         ({sample_dimension})")
            });
            return Ok(false);
        }

        if counter < sample_dimension {
            // a dense sample may spell out only its left part; the sparse
            // suffix is filled up with zeros
            self.warn(|| {
                format!(
                    "A dense sample has a sparse suffix (expected size = \
                     {sample_dimension}, actual size = {counter})"
                )
            });
            values.resize(values.len() + (sample_dimension - counter), T::from_f64(0.0));
        }

        Ok(true)
    }

    /// Read the `index:value` pairs of a sparse sample. Empty samples are
    /// legal. A malformed pair is dropped: the reader warns, charges one
    /// error, resynchronises to the next value, and keeps collecting pairs.
    fn read_sparse_sample(
        &mut self,
        values: &mut Vec<T>,
        indices: &mut Vec<u32>,
        sample_dimension: usize,
        bytes_to_read: &mut usize,
    ) -> Result<()> {
        while *bytes_to_read > 0 && self.window.can_read()? {
            let c = self.window.peek();

            if c < VALUE_DELIMITER || c == NAME_PREFIX {
                return Ok(());
            }

            if c == VALUE_DELIMITER || c == INDEX_DELIMITER {
                // benign separators between pairs
                self.window.advance();
                *bytes_to_read -= 1;
                continue;
            }

            if !self.read_sparse_pair(values, indices, sample_dimension, bytes_to_read)? {
                self.diag.count_error()?;
                self.skip_to_next_value(bytes_to_read)?;
            }
        }

        // out of input after complete pairs: the sample stands
        Ok(())
    }

    fn read_sparse_pair(
        &mut self,
        values: &mut Vec<T>,
        indices: &mut Vec<u32>,
        sample_dimension: usize,
        bytes_to_read: &mut usize,
    ) -> Result<bool> {
        let index = match scan::read_u64(&mut self.window, bytes_to_read, &mut self.diag)? {
            Some(index) => index,
            None => return Ok(false),
        };

        // non-strict bound: an index equal to the sample dimension passes
        if index > sample_dimension as u64 {
            self.warn(|| {
                format!(
                    "Sparse index value ({index}) exceeds the expected sample \
                     size ({sample_dimension})"
                )
            });
            return Ok(false);
        }

        if *bytes_to_read == 0 || !self.window.can_read()? {
            self.warn(|| "Exhausted all input after a sparse index".to_string());
            return Ok(false);
        }

        let c = self.window.peek();
        if c != INDEX_DELIMITER {
            self.warn(|| {
                format!(
                    "Unexpected character ('{}') in place of the index delimiter \
                     (':') after a sparse value index ({index})",
                    c as char
                )
            });
            return Ok(false);
        }
        self.window.advance();
        *bytes_to_read -= 1;

        match scan::read_real::<T>(&mut self.window, bytes_to_read, &mut self.diag)? {
            Some(value) => {
                values.push(value);
                indices.push(index as u32);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Resynchronise after a failed sample: skip to the next name prefix or
    /// end of row.
    fn skip_to_next_input(&mut self, bytes_to_read: &mut usize) -> Result<()> {
        while *bytes_to_read > 0 && self.window.can_read()? {
            let c = self.window.peek();
            if c == NAME_PREFIX || c == ROW_DELIMITER {
                return Ok(());
            }
            self.window.advance();
            *bytes_to_read -= 1;
        }
        Ok(())
    }

    /// Resynchronise after a failed sparse pair: skip to the next value
    /// marker, name prefix, or end of row.
    fn skip_to_next_value(&mut self, bytes_to_read: &mut usize) -> Result<()> {
        while *bytes_to_read > 0 && self.window.can_read()? {
            let c = self.window.peek();
            if c == VALUE_DELIMITER || c == NAME_PREFIX || c == ROW_DELIMITER {
                return Ok(());
            }
            self.window.advance();
            *bytes_to_read -= 1;
        }
        Ok(())
    }
}
