//! Refillable byte window over the input file
//!
//! The decoder never holds more than one fixed-size buffer of the file in
//! memory. The window tracks the absolute file offsets corresponding to the
//! buffered range, so byte positions recorded by the indexer can be mapped
//! back into the buffer, and diagnostics can name exact offsets.
//!
//! Invariant: `offset_start + pos == current absolute byte offset`.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Size of the refillable window (64 KiB)
pub(crate) const BUFFER_SIZE: usize = 64 * 1024;

pub(crate) struct FileWindow {
    file: File,
    buffer: Vec<u8>,
    capacity: usize,
    /// Index of the next byte to consume
    pos: usize,
    /// Absolute file offset of `buffer[0]`
    offset_start: u64,
    /// Absolute file offset one past the buffered range
    offset_end: u64,
}

impl FileWindow {
    /// Open a file with the default window capacity.
    pub(crate) fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::with_capacity(path, BUFFER_SIZE)
    }

    /// Open a file with an explicit window capacity (small capacities are
    /// used by tests to force refills on short inputs).
    pub(crate) fn with_capacity<P: AsRef<Path>>(path: P, capacity: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            file,
            buffer: Vec::with_capacity(capacity),
            capacity,
            pos: 0,
            offset_start: 0,
            offset_end: 0,
        })
    }

    /// Read the next window starting at `offset_end`. Returns `false` at
    /// end of file.
    pub(crate) fn refill(&mut self) -> io::Result<bool> {
        self.file.seek(SeekFrom::Start(self.offset_end))?;
        self.buffer.resize(self.capacity, 0);
        let bytes_read = self.file.read(&mut self.buffer)?;
        self.buffer.truncate(bytes_read);
        self.pos = 0;
        self.offset_start = self.offset_end;
        self.offset_end += bytes_read as u64;
        Ok(bytes_read > 0)
    }

    /// Discard the buffer and continue reading from `offset`.
    pub(crate) fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.offset_start = offset;
        self.offset_end = offset;
        self.buffer.clear();
        self.pos = 0;
        self.refill()?;
        Ok(())
    }

    /// Reposition at an absolute offset, seeking only when the offset falls
    /// outside the buffered range.
    pub(crate) fn position_at(&mut self, offset: u64) -> io::Result<()> {
        if offset < self.offset_start || offset > self.offset_end {
            self.seek(offset)?;
        }
        self.pos = (offset - self.offset_start) as usize;
        Ok(())
    }

    /// Whether at least one byte is available, refilling if needed.
    pub(crate) fn can_read(&mut self) -> io::Result<bool> {
        if self.pos < self.buffer.len() {
            Ok(true)
        } else {
            self.refill()
        }
    }

    /// The byte at the current position. Only valid after `can_read`
    /// returned `true`.
    pub(crate) fn peek(&self) -> u8 {
        self.buffer[self.pos]
    }

    /// Consume the current byte.
    pub(crate) fn advance(&mut self) {
        self.pos += 1;
    }

    /// Absolute file offset of the current position.
    pub(crate) fn file_offset(&self) -> u64 {
        self.offset_start + self.pos as u64
    }

    /// The unconsumed remainder of the buffered range.
    pub(crate) fn buffered(&self) -> &[u8] {
        &self.buffer[self.pos..]
    }
}
