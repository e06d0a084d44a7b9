//! Transport-level decompression
//!
//! The gateway compresses the whole connection as one continuous zlib
//! stream, not individual messages. One [`Decompressor`] therefore lives for
//! exactly one transport: it keeps the shared inflate context and carves the
//! incoming byte stream into complete payloads at each flush marker.

use flate2::{Decompress, FlushDecompress, Status};

/// Marker the server emits at the end of every complete payload
/// (the zlib sync-flush trailer).
pub const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

const INFLATE_CHUNK: usize = 16 * 1024;

/// Decompression errors
#[derive(Debug, thiserror::Error)]
pub enum DecompressError {
    /// The compressed stream is corrupt.
    #[error("corrupted compressed stream: {0}")]
    Inflate(#[from] flate2::DecompressError),

    /// The stream ended mid-connection, which the gateway never does.
    #[error("compressed stream ended unexpectedly")]
    StreamEnded,
}

/// Stateful inflater for one gateway connection.
pub struct Decompressor {
    context: Decompress,
    buffer: Vec<u8>,
}

impl Decompressor {
    /// Fresh context for a new transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            context: Decompress::new(true),
            buffer: Vec::new(),
        }
    }

    /// Feed one raw chunk from the transport.
    ///
    /// Chunk boundaries carry no meaning: a chunk may hold a fraction of a
    /// payload or several complete ones. Returns every payload completed by
    /// this chunk, each fully inflated.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, DecompressError> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(end) = find_suffix(&self.buffer) {
            let segment: Vec<u8> = self.buffer.drain(..end + ZLIB_SUFFIX.len()).collect();
            payloads.push(self.inflate(&segment)?);
        }
        Ok(payloads)
    }

    /// Bytes buffered waiting for a flush marker.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn inflate(&mut self, segment: &[u8]) -> Result<Vec<u8>, DecompressError> {
        let mut out = Vec::with_capacity(INFLATE_CHUNK);
        let mut offset = 0usize;

        loop {
            if out.len() == out.capacity() {
                out.reserve(INFLATE_CHUNK);
            }
            let before_in = self.context.total_in();
            let status =
                self.context
                    .decompress_vec(&segment[offset..], &mut out, FlushDecompress::Sync)?;
            offset += (self.context.total_in() - before_in) as usize;

            match status {
                Status::StreamEnd => return Err(DecompressError::StreamEnded),
                Status::Ok | Status::BufError => {
                    if offset >= segment.len() && out.len() < out.capacity() {
                        return Ok(out);
                    }
                }
            }
        }
    }
}

impl Default for Decompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Decompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decompressor")
            .field("pending", &self.buffer.len())
            .finish()
    }
}

fn find_suffix(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(ZLIB_SUFFIX.len())
        .position(|window| window == ZLIB_SUFFIX)
}
