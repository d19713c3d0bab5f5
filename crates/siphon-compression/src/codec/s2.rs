//! S2 adapter backed by snap
//!
//! S2 is a Snappy extension and every S2 decoder reads Snappy data, so the
//! buffered path emits a Snappy block and the streaming path emits the
//! Snappy framing format. Level chooses between the fast and the better
//! S2 strategy: level 0 or anything above 3 is "better", the rest is "fast".
//! snap exposes one encoder, so both strategies currently share it; the
//! selected strategy is traced with each call.

use crate::compressor::{Compressor, Encoder, DEFAULT_MIN_LENGTH};
use crate::error::{CompressionError, Result};
use snap::write::FrameEncoder;
use std::io::{self, Write};

/// Content-Encoding token for s2
pub const S2_ENCODING: &str = "s2";

/// S2 compression strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S2Mode {
    /// Fastest encoding
    Fast,
    /// Slower encoding with a better ratio
    Better,
}

impl S2Mode {
    /// Strategy for a level
    pub fn for_level(level: i32) -> Self {
        if level == 0 || level > 3 {
            S2Mode::Better
        } else {
            S2Mode::Fast
        }
    }
}

/// S2 compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct S2Compressor {
    level: i32,
    min_length: usize,
}

impl S2Compressor {
    /// Create an s2 compressor; level 0 selects the better strategy
    pub fn new() -> Self {
        Self {
            level: 0,
            min_length: DEFAULT_MIN_LENGTH,
        }
    }

    /// Set the level used when a call passes zero
    #[must_use]
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Set the minimum body size
    #[must_use]
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    /// Strategy for a call
    pub fn mode(&self, requested: i32) -> S2Mode {
        if requested == 0 {
            S2Mode::for_level(self.level)
        } else {
            S2Mode::for_level(requested)
        }
    }
}

impl Default for S2Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for S2Compressor {
    fn encoding(&self) -> &'static str {
        S2_ENCODING
    }

    fn min_length(&self) -> usize {
        self.min_length
    }

    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        let mode = self.mode(level);
        tracing::trace!(?mode, size = data.len(), "s2 block encode");
        snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| CompressionError::codec(S2_ENCODING, e.to_string()))
    }

    fn encoder<'a>(
        &self,
        writer: &'a mut dyn Write,
        level: i32,
    ) -> io::Result<Box<dyn Encoder + 'a>> {
        let mode = self.mode(level);
        tracing::trace!(?mode, "s2 stream encode");
        Ok(Box::new(FrameEncoder::new(writer)))
    }
}

impl<W: Write> Encoder for FrameEncoder<W> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        // the framing format has no trailer; flushing closes the last frame
        self.flush()
    }
}
