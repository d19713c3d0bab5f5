//! deflate adapter backed by flate2

use crate::compressor::{resolve_level, Compressor, Encoder, DEFAULT_MIN_LENGTH};
use crate::error::Result;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{self, Write};

/// Content-Encoding token for deflate
pub const DEFLATE_ENCODING: &str = "deflate";

const MAX_DEFLATE_LEVEL: i32 = 9;
const DEFAULT_DEFLATE_LEVEL: i32 = 6;

/// Raw deflate compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateCompressor {
    level: i32,
    min_length: usize,
}

impl DeflateCompressor {
    /// Create a deflate compressor with the default level and threshold
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

    fn compression(&self, requested: i32) -> Compression {
        let level = resolve_level(
            requested,
            self.level,
            DEFAULT_DEFLATE_LEVEL,
            MAX_DEFLATE_LEVEL,
        );
        Compression::new(level as u32)
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for DeflateCompressor {
    fn encoding(&self) -> &'static str {
        DEFLATE_ENCODING
    }

    fn min_length(&self) -> usize {
        self.min_length
    }

    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::new(), self.compression(level));
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn encoder<'a>(
        &self,
        writer: &'a mut dyn Write,
        level: i32,
    ) -> io::Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(DeflateEncoder::new(writer, self.compression(level))))
    }
}

impl<W: Write> Encoder for DeflateEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        DeflateEncoder::finish(*self).map(drop)
    }
}
