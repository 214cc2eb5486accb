//! NUL-delimited transport codec for JSON-RPC messages.
//!
//! The Core terminates every JSON message with a single NUL byte and sends
//! them back to back on one TCP stream:
//! ```text
//! +------------------+----+------------------+----+
//! |  JSON payload    | 00 |  JSON payload    | 00 | ...
//! +------------------+----+------------------+----+
//! ```
//!
//! Only NUL-terminated segments are complete. Bytes after the last NUL are
//! an incomplete frame and stay buffered until more data arrives. A complete
//! segment that fails to parse is corrupt: it is logged with its stream
//! offset and dropped, and decoding continues with the next frame.

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde_json::Value;
use serde_json::error::Category;
use std::io;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::protocol::Request;

/// Frame terminator
pub const NUL: u8 = 0;

/// Maximum buffered frame size (16 MB)
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Codec for NUL-terminated JSON frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Where to resume scanning for the terminator in the current buffer
    next_index: usize,
    /// Stream offset of the first byte in the buffer
    consumed: usize,
    /// Corrupt frames dropped so far
    dropped: usize,
}

impl FrameCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of corrupt frames dropped since creation.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Parse one complete segment; `None` for empty or corrupt segments.
    fn parse_segment(&mut self, payload: &[u8], offset: usize) -> Option<Value> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        match serde_json::from_slice(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                self.dropped += 1;
                let reason = if e.classify() == Category::Eof {
                    "truncated"
                } else {
                    "corrupt"
                };
                warn!(
                    offset,
                    len = payload.len(),
                    error = %e,
                    "Dropping {reason} frame"
                );
                None
            }
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Value;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let start = self.next_index.min(src.len());
            let Some(pos) = src[start..].iter().position(|b| *b == NUL) else {
                if src.len() > MAX_FRAME_SIZE {
                    return Err(CodecError::FrameTooLarge(src.len()));
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let end = start + pos;
            let frame = src.split_to(end + 1);
            let offset = self.consumed;
            self.consumed += frame.len();
            self.next_index = 0;

            if let Some(value) = self.parse_segment(&frame[..end], offset) {
                return Ok(Some(value));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(value) = self.decode(buf)? {
            return Ok(Some(value));
        }

        if buf.is_empty() {
            return Ok(None);
        }

        // Stream ended without a terminator; accept the tail only if it is whole.
        let tail = buf.split();
        let offset = self.consumed;
        self.consumed += tail.len();
        self.next_index = 0;

        if let Ok(value) = serde_json::from_slice(&tail) {
            return Ok(Some(value));
        }

        debug!(offset, len = tail.len(), "Discarding unterminated trailing frame");
        Ok(None)
    }
}

fn encode_json<T: Serialize>(item: &T, dst: &mut BytesMut) -> Result<(), CodecError> {
    let json = serde_json::to_vec(item)?;

    if json.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(json.len()));
    }

    dst.reserve(json.len() + 1);
    dst.put_slice(&json);
    dst.put_u8(NUL);

    Ok(())
}

impl Encoder<Request> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_json(&item, dst)
    }
}

impl Encoder<Value> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_json(&item, dst)
    }
}

/// Errors that can occur during codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),
}

/// Incremental frame parser over an accumulating buffer.
///
/// Feed bytes with [`push`](Self::push) as they arrive and drain complete
/// frames with [`frames`](Self::frames); the unconsumed remainder is kept.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: BytesMut,
    codec: FrameCodec,
}

impl FrameParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Lazily yields the complete frames currently buffered, in arrival order.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames {
            parser: self,
            eof: false,
        }
    }

    /// Drain everything, treating the buffer as the end of the stream.
    pub fn finish(&mut self) -> Vec<Value> {
        Frames {
            parser: self,
            eof: true,
        }
        .collect()
    }

    /// Bytes of incomplete frame data still buffered.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn dropped(&self) -> usize {
        self.codec.dropped()
    }
}

/// Iterator returned by [`FrameParser::frames`].
pub struct Frames<'a> {
    parser: &'a mut FrameParser,
    eof: bool,
}

impl Iterator for Frames<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let FrameParser { buffer, codec } = &mut *self.parser;
        let decoded = if self.eof {
            codec.decode_eof(buffer)
        } else {
            codec.decode(buffer)
        };

        match decoded {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Discarding receive buffer");
                buffer.clear();
                codec.next_index = 0;
                None
            }
        }
    }
}

/// Parse a complete buffer in one pass, including an unterminated final frame.
#[must_use]
pub fn parse(buffer: &[u8]) -> Vec<Value> {
    let mut parser = FrameParser::new();
    parser.push(buffer);
    parser.finish()
}
