//! LZ4 frame adapter backed by lz4_flex
//!
//! lz4_flex has a single compression effort, so the level picks the frame
//! layout instead. Larger, linked blocks let matches reach further back and
//! raise the ratio at the cost of encoder memory.
//!
//! | level | block size | blocks      |
//! |-------|------------|-------------|
//! | 1     | 64 KiB     | independent |
//! | 2     | 256 KiB    | linked      |
//! | 3     | 1 MiB      | linked      |
//! | 4     | 4 MiB      | linked      |

use crate::compressor::{resolve_level, Compressor, Encoder, DEFAULT_MIN_LENGTH};
use crate::error::{CompressionError, Result};
use lz4_flex::frame::{BlockMode, BlockSize, FrameEncoder, FrameInfo};
use std::io::{self, Write};

/// Content-Encoding token for lz4
pub const LZ4_ENCODING: &str = "lz4";

const MAX_LZ4_LEVEL: i32 = 4;
const DEFAULT_LZ4_LEVEL: i32 = 1;

/// LZ4 frame compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lz4Compressor {
    level: i32,
    min_length: usize,
}

impl Lz4Compressor {
    /// Create an lz4 compressor with the default level and threshold
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

    /// Frame layout for a call
    pub fn frame_info(&self, requested: i32) -> FrameInfo {
        let (block_size, block_mode) =
            match resolve_level(requested, self.level, DEFAULT_LZ4_LEVEL, MAX_LZ4_LEVEL) {
                1 => (BlockSize::Max64KB, BlockMode::Independent),
                2 => (BlockSize::Max256KB, BlockMode::Linked),
                3 => (BlockSize::Max1MB, BlockMode::Linked),
                _ => (BlockSize::Max4MB, BlockMode::Linked),
            };

        let mut info = FrameInfo::new();
        info.block_size = block_size;
        info.block_mode = block_mode;
        info.content_checksum = true;
        info
    }
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for Lz4Compressor {
    fn encoding(&self) -> &'static str {
        LZ4_ENCODING
    }

    fn min_length(&self) -> usize {
        self.min_length
    }

    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        let mut encoder = FrameEncoder::with_frame_info(self.frame_info(level), Vec::new());
        encoder.write_all(data)?;
        encoder.finish().map_err(|e| CompressionError::codec(LZ4_ENCODING, e.to_string()))
    }

    fn encoder<'a>(
        &self,
        writer: &'a mut dyn Write,
        level: i32,
    ) -> io::Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(FrameEncoder::with_frame_info(
            self.frame_info(level),
            writer,
        )))
    }
}

impl<W: Write> Encoder for FrameEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        FrameEncoder::finish(*self).map(drop).map_err(io::Error::from)
    }
}
