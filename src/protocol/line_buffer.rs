//! Line buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` so socket reads append without reallocating on
//! every push. Server responses are single `\n`-terminated lines; a read may
//! deliver half a line or several lines at once, so leftover bytes stay
//! buffered for the next response.
//!
//! # Example
//!
//! ```
//! use pixelflut_client::protocol::LineBuffer;
//!
//! let mut buffer = LineBuffer::new(256);
//! assert_eq!(buffer.push(b"SIZE 80").unwrap(), None);
//! assert_eq!(buffer.push(b"0 600\n").unwrap().as_deref(), Some("SIZE 800 600"));
//! ```

use bytes::BytesMut;

use crate::error::{PixelflutError, Result};

/// Default byte budget for a single response line.
pub const DEFAULT_MAX_LINE_LEN: usize = 256;

/// Buffer that yields complete response lines.
pub struct LineBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Bytes already scanned for a terminator, so pushes don't rescan.
    scanned: usize,
    /// Longest accepted line, terminator excluded.
    max_line_len: usize,
    /// Dropping the tail of an overlong line until its terminator arrives.
    discarding: bool,
}

impl LineBuffer {
    /// Create a buffer accepting lines up to `max_line_len` bytes.
    pub fn new(max_line_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_line_len + 1),
            scanned: 0,
            max_line_len,
            discarding: false,
        }
    }

    /// Append data and try to extract the next complete line.
    ///
    /// Returns `Ok(None)` if more data is needed. Only one line is taken;
    /// call [`next_line`](Self::next_line) to drain any further buffered lines.
    ///
    /// # Errors
    ///
    /// Returns a protocol error once the budget is exceeded without a
    /// terminator, or if the line is not valid UTF-8. The offending line is
    /// dropped, so later lines are still delivered.
    pub fn push(&mut self, data: &[u8]) -> Result<Option<String>> {
        self.buffer.extend_from_slice(data);
        self.next_line()
    }

    /// Extract the next complete buffered line, if any.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        if self.discarding && !self.skip_overlong_tail() {
            return Ok(None);
        }

        let unscanned = &self.buffer[self.scanned..];
        match unscanned.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let end = self.scanned + pos;
                self.scanned = 0;
                if end > self.max_line_len {
                    let _ = self.buffer.split_to(end + 1);
                    return Err(self.overflow());
                }

                let mut line = self.buffer.split_to(end + 1);
                line.truncate(end);
                if line.last() == Some(&b'\r') {
                    line.truncate(end - 1);
                }

                String::from_utf8(line.to_vec())
                    .map(Some)
                    .map_err(|_| PixelflutError::Protocol("response line is not UTF-8".into()))
            }
            None => {
                if self.buffer.len() > self.max_line_len {
                    self.clear();
                    self.discarding = true;
                    return Err(self.overflow());
                }
                self.scanned = self.buffer.len();
                Ok(None)
            }
        }
    }

    /// Drop bytes through the terminator of an overlong line.
    ///
    /// Returns `false` while that terminator has not arrived yet.
    fn skip_overlong_tail(&mut self) -> bool {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let _ = self.buffer.split_to(pos + 1);
                self.discarding = false;
                true
            }
            None => {
                self.buffer.clear();
                false
            }
        }
    }

    fn overflow(&self) -> PixelflutError {
        PixelflutError::Protocol(format!(
            "no line terminator within {} bytes",
            self.max_line_len
        ))
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.discarding = false;
    }

    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}
