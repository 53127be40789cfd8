//! Worker wire framing.
//!
//! A request to a worker is the module encoded as standard padded base64,
//! followed by a single `\n`. The text alphabet guarantees that the newline
//! can only appear as the terminator.
//!
//! Both sides work incrementally. [`FrameEncoder`] is fed the inbound body
//! chunk by chunk and only ever emits complete 3-byte groups; the 0-2 bytes
//! left over from a chunk are carried into the next one, and the final
//! partial group is padded by [`FrameEncoder::finish`]. The concatenated
//! output is therefore identical to encoding the whole module at once, no
//! matter where the chunk boundaries fall. [`FrameDecoder`] mirrors this with
//! a carry of 0-3 characters and treats the group before the newline as the
//! last block.

use std::io::{ErrorKind, Read};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::{FrameError, Result};

/// Byte that terminates a request frame.
pub const FRAME_TERMINATOR: u8 = b'\n';

const READ_BUFFER_SIZE: usize = 4096;

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Incremental frame encoder.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    carry: [u8; 2],
    carry_len: usize,
    consumed: usize,
}

impl FrameEncoder {
    /// Create an encoder for a new frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of raw module bytes pushed so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Encode `chunk`, appending the text for every complete group to `out`.
    pub fn push(&mut self, mut chunk: &[u8], out: &mut String) {
        self.consumed += chunk.len();

        if self.carry_len > 0 {
            let need = 3 - self.carry_len;
            if chunk.len() < need {
                self.carry[self.carry_len..self.carry_len + chunk.len()].copy_from_slice(chunk);
                self.carry_len += chunk.len();
                return;
            }

            let mut group = [0u8; 3];
            group[..self.carry_len].copy_from_slice(&self.carry[..self.carry_len]);
            group[self.carry_len..].copy_from_slice(&chunk[..need]);
            STANDARD.encode_string(group, out);

            chunk = &chunk[need..];
            self.carry_len = 0;
        }

        let whole = chunk.len() - chunk.len() % 3;
        STANDARD.encode_string(&chunk[..whole], out);

        let rest = &chunk[whole..];
        self.carry[..rest.len()].copy_from_slice(rest);
        self.carry_len = rest.len();
    }

    /// Encode the final partial group (with padding) and the terminator.
    pub fn finish(self, out: &mut String) {
        STANDARD.encode_string(&self.carry[..self.carry_len], out);
        out.push(FRAME_TERMINATOR as char);
    }
}

/// Encode a whole module as one frame, terminator included.
pub fn encode_frame(module: &[u8]) -> String {
    let mut out = String::with_capacity(module.len().div_ceil(3) * 4 + 1);
    let mut encoder = FrameEncoder::new();
    encoder.push(module, &mut out);
    encoder.finish(&mut out);
    out
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Incremental frame decoder with a size limit on the decoded module.
#[derive(Debug)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    decoded: Vec<u8>,
    limit: usize,
    padded: bool,
    complete: bool,
}

impl FrameDecoder {
    /// Create a decoder that rejects modules larger than `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            pending: Vec::with_capacity(4),
            decoded: Vec::new(),
            limit,
            padded: false,
            complete: false,
        }
    }

    /// Feed raw frame text. Returns `true` once the terminator is reached;
    /// anything after it is ignored.
    pub fn push(&mut self, input: &[u8]) -> Result<bool> {
        if self.complete {
            return Ok(true);
        }

        let (segment, terminated) = match input.iter().position(|&b| b == FRAME_TERMINATOR) {
            Some(pos) => (&input[..pos], true),
            None => (input, false),
        };

        if self.padded && !segment.is_empty() {
            return Err(FrameError::Decode {
                reason: "data after final padded group".into(),
            });
        }

        self.pending.extend_from_slice(segment);

        let take = if terminated {
            self.pending.len()
        } else {
            self.pending.len() - self.pending.len() % 4
        };

        if take > 0 {
            let block = &self.pending[..take];
            if block.last() == Some(&b'=') {
                self.padded = true;
            }
            STANDARD
                .decode_vec(block, &mut self.decoded)
                .map_err(|e| FrameError::Decode {
                    reason: e.to_string(),
                })?;
            self.pending.drain(..take);
        }

        if self.decoded.len() > self.limit {
            return Err(FrameError::TooLarge { limit: self.limit });
        }

        self.complete = terminated;
        Ok(terminated)
    }

    /// Return the decoded module. Fails if the terminator was never seen.
    pub fn finish(self) -> Result<Vec<u8>> {
        if !self.complete {
            return Err(FrameError::Truncated);
        }
        Ok(self.decoded)
    }
}

/// Decode a complete frame held in memory.
pub fn decode_frame(text: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut decoder = FrameDecoder::new(limit);
    decoder.push(text)?;
    decoder.finish()
}

/// Read one frame from a blocking reader (the worker's standard input).
pub fn read_frame<R: Read>(reader: &mut R, limit: usize) -> Result<Vec<u8>> {
    let mut decoder = FrameDecoder::new(limit);
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => return Err(FrameError::Truncated),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        if decoder.push(&buffer[..read])? {
            return decoder.finish();
        }
    }
}
