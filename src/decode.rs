//! Line decoders for the quoted-printable and hex-escape script encodings.
//!
//! Both decoders run in place: at every step the partial result is never
//! longer than the consumed input, so the write cursor can never overtake
//! the read cursor.

use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// An escape sequence was started but not completed, or a byte is not
    /// representable in the encoding.
    #[error("invalid encoding in input line")]
    InvalidEncoding,
    /// The decoded result would exceed the destination capacity. The
    /// in-place length guarantee keeps this from triggering in practice.
    #[error("decoded line exceeds destination capacity")]
    Length,
}

impl DecodeError {
    /// The errno-shaped code this error maps to.
    pub fn errno(self) -> Errno {
        match self {
            DecodeError::InvalidEncoding => Errno::EINVAL,
            DecodeError::Length => Errno::ENAMETOOLONG,
        }
    }
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(10 + b - b'a'),
        b'A'..=b'F' => Some(10 + b - b'A'),
        _ => None,
    }
}

// Printable ASCII, space, or tab.
fn is_qp_literal(b: u8) -> bool {
    b == b'\t' || (0x20..=0x7e).contains(&b)
}

/// Decode a MIME quoted-printable line (RFC 2045) in place.
///
/// `=HH` decodes to the byte with value `HH`; `=` followed by CR or LF is a
/// soft line break and emits nothing; stray CR/LF bytes are skipped; any
/// other byte outside the printable/space/tab set is an error.
///
/// Returns the decoded length. The buffer is truncated to it.
pub fn qp_decode_in_place(buf: &mut Vec<u8>) -> Result<usize, DecodeError> {
    let cap = buf.len();
    let mut r = 0;
    let mut w = 0;
    while r < buf.len() {
        if w >= cap {
            return Err(DecodeError::Length);
        }
        let c = buf[r];
        if c == b'=' {
            match buf.get(r + 1).copied() {
                // Soft line break. A following bare LF of a CRLF pair is
                // swallowed by the stray-CR/LF rule on the next pass.
                Some(b'\r') | Some(b'\n') => {
                    r += 2;
                }
                Some(hh) => {
                    let hi = hex_val(hh).ok_or(DecodeError::InvalidEncoding)?;
                    let lo = buf
                        .get(r + 2)
                        .copied()
                        .and_then(hex_val)
                        .ok_or(DecodeError::InvalidEncoding)?;
                    buf[w] = (hi << 4) | lo;
                    w += 1;
                    r += 3;
                }
                None => return Err(DecodeError::InvalidEncoding),
            }
        } else if is_qp_literal(c) {
            buf[w] = c;
            w += 1;
            r += 1;
        } else if c == b'\r' || c == b'\n' {
            r += 1;
        } else {
            return Err(DecodeError::InvalidEncoding);
        }
    }
    buf.truncate(w);
    Ok(w)
}

/// Decode a hex-escape ("xnn") line in place.
///
/// The four-byte sequence `\xHH` decodes to the byte with value `HH`; every
/// other byte passes through unchanged. A `\x` that is not completed by two
/// hex digits before the end of the line is an error.
pub fn xnn_decode_in_place(buf: &mut Vec<u8>) -> Result<usize, DecodeError> {
    let cap = buf.len();
    let mut r = 0;
    let mut w = 0;
    while r < buf.len() {
        if w >= cap {
            return Err(DecodeError::Length);
        }
        let c = buf[r];
        if c == b'\\' && buf.get(r + 1) == Some(&b'x') {
            let hi = buf
                .get(r + 2)
                .copied()
                .and_then(hex_val)
                .ok_or(DecodeError::InvalidEncoding)?;
            let lo = buf
                .get(r + 3)
                .copied()
                .and_then(hex_val)
                .ok_or(DecodeError::InvalidEncoding)?;
            buf[w] = (hi << 4) | lo;
            w += 1;
            r += 4;
        } else {
            buf[w] = c;
            w += 1;
            r += 1;
        }
    }
    buf.truncate(w);
    Ok(w)
}
