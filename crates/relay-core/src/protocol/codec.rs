//! JSON packet codec and newline framing.
//!
//! Wire format on line-oriented transports (TCP):
//! ```text
//! {"id":"...","time":1700000000000,"type":"BROADCAST","data":{...}}\n
//! ```
//! On WebSocket transports the same JSON object is sent as one message with no
//! terminator, since message boundaries come from the WebSocket framing.
//!
//! `metadata` is never written; decoding yields a packet with empty metadata.

use serde::Serialize;
use thiserror::Error;

use crate::protocol::packet::Packet;

/// Largest frame the [`LineFramer`] will buffer while waiting for a newline.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors that can occur while encoding, framing or decoding packets.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame is not a JSON packet object.
    #[error("malformed packet JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame grew past the configured limit without a line terminator.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// The frame contained no bytes (after stripping the line terminator).
    #[error("empty frame")]
    EmptyFrame,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Serializes a packet to its JSON wire form (no terminator).
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the payload cannot be represented as JSON
/// (for example a map with non-string keys).
///
/// # Examples
///
/// ```rust
/// use relay_core::{decode_packet, encode_packet, Packet};
/// use serde_json::json;
///
/// let packet: Packet = Packet::new("PING", json!({"n": 1}));
/// let bytes = encode_packet(&packet).unwrap();
/// let decoded = decode_packet(&bytes).unwrap();
/// assert_eq!(decoded, packet);
/// ```
pub fn encode_packet<T: Serialize, M>(packet: &Packet<T, M>) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(packet)?)
}

/// Serializes a packet followed by `\n`, ready to be written to a TCP stream.
///
/// # Errors
///
/// Same as [`encode_packet`].
pub fn encode_line<T: Serialize, M>(packet: &Packet<T, M>) -> Result<Vec<u8>, CodecError> {
    let mut bytes = encode_packet(packet)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes one packet from a single frame.
///
/// A trailing `\n` or `\r\n` is tolerated so callers can pass raw lines.
///
/// # Errors
///
/// Returns [`CodecError::EmptyFrame`] for a blank frame and
/// [`CodecError::Json`] if the frame is not a packet object.
pub fn decode_packet(frame: &[u8]) -> Result<Packet, CodecError> {
    let trimmed = strip_line_terminator(frame);
    if trimmed.is_empty() {
        return Err(CodecError::EmptyFrame);
    }
    Ok(serde_json::from_slice(trimmed)?)
}

// ── Line framing ──────────────────────────────────────────────────────────────

/// Accumulates bytes from a stream and yields complete newline-delimited frames.
///
/// TCP is a stream protocol: one `read()` may return half a frame or several
/// frames at once.  Push every chunk into the framer, then drain it with
/// [`LineFramer::next_frame`] until it returns `Ok(None)`.
///
/// Blank lines are skipped and a trailing `\r` is stripped from every frame.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_len: usize,
}

impl LineFramer {
    /// Creates a framer that enforces [`MAX_FRAME_LEN`].
    pub fn new() -> Self {
        Self::with_max_len(MAX_FRAME_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            max_len,
        }
    }

    /// Appends newly received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Removes and returns the next complete frame, without its terminator.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::FrameTooLarge`] when the buffered partial frame
    /// exceeds the limit; the stream cannot be resynchronised after that.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CodecError> {
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let frame = strip_line_terminator(&line);
            if frame.is_empty() {
                continue;
            }
            if frame.len() > self.max_len {
                return Err(CodecError::FrameTooLarge {
                    len: frame.len(),
                    max: self.max_len,
                });
            }
            return Ok(Some(frame.to_vec()));
        }

        if self.buf.len() > self.max_len {
            return Err(CodecError::FrameTooLarge {
                len: self.buf.len(),
                max: self.max_len,
            });
        }
        Ok(None)
    }

    /// Number of bytes of an incomplete frame currently held.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_line_terminator(frame: &[u8]) -> &[u8] {
    let frame = frame.strip_suffix(b"\n").unwrap_or(frame);
    frame.strip_suffix(b"\r").unwrap_or(frame)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
