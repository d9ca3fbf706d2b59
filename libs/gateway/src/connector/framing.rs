//! Newline framing for stream links

use bytes::{Buf, BytesMut};
use tracing::warn;

/// Longest line accepted before the framer starts discarding
pub const MAX_LINE: usize = 16 * 1024 * 1024;

/// Splits a byte stream into `\n`-terminated lines, keeping the partial tail
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    /// Bytes of `buffer` already known to hold no terminator
    scanned: usize,
    max_line: usize,
    /// Dropping the rest of an oversized line
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE)
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            scanned: 0,
            max_line,
            discarding: false,
        }
    }

    /// Buffer that socket reads append to
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete non-empty line, without its terminator.
    ///
    /// Lines longer than the maximum are dropped whole.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = self.buffer.len();
                if self.buffer.len() > self.max_line {
                    if !self.discarding {
                        warn!(bytes = self.buffer.len(), max = self.max_line, "Discarding oversized line");
                    }
                    self.buffer.clear();
                    self.scanned = 0;
                    self.discarding = true;
                }
                return None;
            };
            let line = self.buffer.split_to(self.scanned + offset);
            self.buffer.advance(1);
            self.scanned = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if line.len() > self.max_line {
                warn!(bytes = line.len(), max = self.max_line, "Discarding oversized line");
                continue;
            }
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches('\r');
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }

    /// Bytes held back waiting for a terminator
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
