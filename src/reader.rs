//! Delimiter-terminated line reading of unbounded length.
//!
//! Bytes are accumulated through fixed-capacity chunks and concatenated
//! exactly once when the line is complete, so no previously-read byte is
//! copied more than once no matter how long the line grows.

use std::io::{self, BufRead};

use thiserror::Error;

use crate::command::Encoding;
use crate::decode::{self, DecodeError};

/// Capacity of one accumulation chunk.
pub const CHUNK_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("read error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Ordered list of fixed-capacity chunks holding one partial line.
///
/// Cleared at the start of every read; this is scratch space per call, not
/// a cache.
#[derive(Debug, Default)]
struct ChunkList {
    chunks: Vec<Vec<u8>>,
}

impl ChunkList {
    fn clear(&mut self) {
        self.chunks.clear();
    }

    fn push(&mut self, chunk: Vec<u8>) {
        self.chunks.push(chunk);
    }

    fn total_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Concatenate every chunk, in order, into `out`. One copy per byte.
    fn gather_into(&self, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(self.total_len());
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
    }
}

/// Wraps one input stream and yields one decoded line per call.
///
/// The line buffer is owned by the reader and reused across calls; callers
/// borrow the current line through [`LineBuffer::line`].
#[derive(Debug)]
pub struct LineBuffer<R> {
    stream: R,
    chunks: ChunkList,
    buf: Vec<u8>,
    eof: bool,
    err: Option<DecodeError>,
}

impl<R: BufRead> LineBuffer<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            chunks: ChunkList::default(),
            buf: Vec::new(),
            eof: false,
            err: None,
        }
    }

    /// The most recently read line, without its delimiter.
    pub fn line(&self) -> &[u8] {
        &self.buf
    }

    /// True once end of stream has been observed with no bytes consumed.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// The most recent decode failure, if any.
    pub fn last_error(&self) -> Option<DecodeError> {
        self.err
    }

    /// Read one `delim`-terminated line of unbounded length.
    ///
    /// Returns `Ok(false)` on end of stream with zero bytes consumed; a
    /// final unterminated line is still returned. The trailing delimiter is
    /// stripped.
    pub fn read_line(&mut self, delim: u8) -> io::Result<bool> {
        self.chunks.clear();
        let mut saw_delim = false;
        'line: loop {
            let mut chunk = Vec::with_capacity(CHUNK_SIZE);
            while chunk.len() < CHUNK_SIZE {
                let avail = self.stream.fill_buf()?;
                if avail.is_empty() {
                    self.chunks.push(chunk);
                    break 'line;
                }
                let room = CHUNK_SIZE - chunk.len();
                let window = &avail[..room.min(avail.len())];
                if let Some(pos) = window.iter().position(|&b| b == delim) {
                    chunk.extend_from_slice(&window[..pos]);
                    self.stream.consume(pos + 1);
                    saw_delim = true;
                    self.chunks.push(chunk);
                    break 'line;
                }
                let n = window.len();
                chunk.extend_from_slice(window);
                self.stream.consume(n);
            }
            self.chunks.push(chunk);
        }

        if !saw_delim && self.chunks.total_len() == 0 {
            self.eof = true;
            self.buf.clear();
            return Ok(false);
        }
        self.chunks.gather_into(&mut self.buf);
        Ok(true)
    }

    /// Read one line and decode it per `encoding`.
    ///
    /// The quoted-printable and hex-escape decoders assume newline-terminated
    /// source lines, so both read with `'\n'` before decoding in place.
    pub fn read_decoded(&mut self, encoding: Encoding) -> Result<bool, ReadError> {
        if !self.read_line(encoding.delimiter())? {
            return Ok(false);
        }
        let decoded = match encoding {
            Encoding::Text | Encoding::Null => Ok(self.buf.len()),
            Encoding::QuotedPrintable => decode::qp_decode_in_place(&mut self.buf),
            Encoding::HexEscape => decode::xnn_decode_in_place(&mut self.buf),
        };
        match decoded {
            Ok(_) => Ok(true),
            Err(e) => {
                self.err = Some(e);
                Err(e.into())
            }
        }
    }
}
