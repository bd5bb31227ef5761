// src/gps/reader.rs
//! Line framing over an async byte stream

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Default upper bound on a line, comfortably above the 82 characters NMEA allows.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 256;

/// One complete candidate line, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub seq: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(RawLine),
    /// A line longer than the limit was skipped up to its terminator.
    Overlength { seq: u64, length: usize },
}

/// Splits a byte stream on LF (CRLF tolerated) with a bounded buffer.
pub struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    max_len: usize,
    seq: u64,
    discarding: Option<usize>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(source: R, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(source),
            buf: Vec::with_capacity(max_len.min(DEFAULT_MAX_LINE_LENGTH)),
            max_len,
            seq: 0,
            discarding: None,
        }
    }

    /// Next frame, or `None` at end of input. A trailing line without a
    /// terminator is still delivered.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<Frame>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if let Some(length) = self.discarding.take() {
                    return Ok(Some(self.overlength(length)));
                }
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let chunk = newline.unwrap_or(available.len());

            match self.discarding {
                Some(length) => self.discarding = Some(length + chunk),
                // One extra byte leaves room for the CR of a CRLF terminator.
                None if self.buf.len() + chunk > self.max_len + 1 => {
                    self.discarding = Some(self.buf.len() + chunk);
                    self.buf.clear();
                }
                None => self.buf.extend_from_slice(&available[..chunk]),
            }

            match newline {
                Some(pos) => {
                    self.inner.consume(pos + 1);
                    if let Some(length) = self.discarding.take() {
                        return Ok(Some(self.overlength(length)));
                    }
                    return Ok(Some(self.take_line()));
                }
                None => self.inner.consume(chunk),
            }
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn overlength(&mut self, length: usize) -> Frame {
        Frame::Overlength {
            seq: self.next_seq(),
            length,
        }
    }

    fn take_line(&mut self) -> Frame {
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        if self.buf.len() > self.max_len {
            let length = self.buf.len();
            self.buf.clear();
            return self.overlength(length);
        }
        let text = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Frame::Line(RawLine {
            seq: self.next_seq(),
            text,
        })
    }
}
