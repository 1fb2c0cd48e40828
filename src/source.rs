//! Block reader that reframes a byte stream into one chunk per line.
//!
//! Input is read in fixed-size blocks. Lines that straddle a block boundary are
//! reassembled through a leftover buffer carried from one read to the next.

use std::collections::VecDeque;
use std::io::{self, Read};

/// Default read size per block.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// One input line with its terminator removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    /// 1-based position of the line in the input.
    pub line_no: u64,
    pub bytes: Vec<u8>,
}

impl RawChunk {
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Splits blocks on `\n`, carrying partial lines between calls.
#[derive(Debug, Default)]
pub struct LineFramer {
    leftover: Vec<u8>,
    lines: u64,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next block; `emit` is called once per completed line, in order.
    pub fn push_block<F: FnMut(RawChunk)>(&mut self, block: &[u8], mut emit: F) {
        let mut start = 0;
        while let Some(offset) = block[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let bytes = if self.leftover.is_empty() {
                block[start..end].to_vec()
            } else {
                let mut line = std::mem::take(&mut self.leftover);
                line.extend_from_slice(&block[start..end]);
                line
            };
            emit(self.chunk(bytes, true));
            start = end + 1;
        }
        self.leftover.extend_from_slice(&block[start..]);
    }

    /// Flush the trailing line that had no terminator, if any.
    pub fn finish(&mut self) -> Option<RawChunk> {
        if self.leftover.is_empty() {
            return None;
        }
        let bytes = std::mem::take(&mut self.leftover);
        Some(self.chunk(bytes, false))
    }

    fn chunk(&mut self, mut bytes: Vec<u8>, terminated: bool) -> RawChunk {
        // CRLF: the carriage return belongs to the terminator
        if terminated && bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        self.lines += 1;
        RawChunk {
            line_no: self.lines,
            bytes,
        }
    }
}

/// Lazy, finite sequence of [`RawChunk`]s read from `reader` in file order.
///
/// Yields `Err` once on the first read failure and then ends.
pub struct SourceStream<R> {
    reader: R,
    block: Vec<u8>,
    framer: LineFramer,
    pending: VecDeque<RawChunk>,
    exhausted: bool,
    bytes_read: u64,
}

impl<R: Read> SourceStream<R> {
    pub fn new(reader: R, block_size: usize) -> Self {
        Self {
            reader,
            block: vec![0u8; block_size.max(1)],
            framer: LineFramer::new(),
            pending: VecDeque::new(),
            exhausted: false,
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read blocks until at least one chunk is pending or the input ends.
    fn fill(&mut self) -> io::Result<()> {
        let Self {
            reader,
            block,
            framer,
            pending,
            exhausted,
            bytes_read,
        } = self;

        while pending.is_empty() {
            match reader.read(block) {
                Ok(0) => {
                    *exhausted = true;
                    if let Some(last) = framer.finish() {
                        pending.push_back(last);
                    }
                    return Ok(());
                }
                Ok(n) => {
                    *bytes_read += n as u64;
                    framer.push_block(&block[..n], |chunk| pending.push_back(chunk));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<R: Read> Iterator for SourceStream<R> {
    type Item = io::Result<RawChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(chunk) = self.pending.pop_front() {
            return Some(Ok(chunk));
        }
        if self.exhausted {
            return None;
        }
        if let Err(e) = self.fill() {
            self.exhausted = true;
            return Some(Err(e));
        }
        self.pending.pop_front().map(Ok)
    }
}
