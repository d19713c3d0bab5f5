//! zstd adapter

use crate::compressor::{resolve_level, Compressor, Encoder, DEFAULT_MIN_LENGTH};
use crate::error::Result;
use std::io::{self, Write};
use zstd::stream::write::Encoder as ZstdEncoder;

/// Content-Encoding token for zstd
pub const ZSTD_ENCODING: &str = "zstd";

const MAX_ZSTD_LEVEL: i32 = 22;
const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Zstandard compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZstdCompressor {
    level: i32,
    min_length: usize,
}

impl ZstdCompressor {
    /// Create a zstd compressor with the default level and threshold
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

    fn effective_level(&self, requested: i32) -> i32 {
        resolve_level(requested, self.level, DEFAULT_ZSTD_LEVEL, MAX_ZSTD_LEVEL)
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for ZstdCompressor {
    fn encoding(&self) -> &'static str {
        ZSTD_ENCODING
    }

    fn min_length(&self) -> usize {
        self.min_length
    }

    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        Ok(zstd::encode_all(data, self.effective_level(level))?)
    }

    fn encoder<'a>(
        &self,
        writer: &'a mut dyn Write,
        level: i32,
    ) -> io::Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(ZstdEncoder::new(writer, self.effective_level(level))?))
    }
}

impl<W: Write> Encoder for ZstdEncoder<'static, W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        ZstdEncoder::finish(*self).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_round_trip() {
        let data = "zstd handles repetitive payloads well. ".repeat(100);
        let zstd = ZstdCompressor::new();

        for level in [0, 1, 19, 50] {
            let compressed = zstd.compress(data.as_bytes(), level).unwrap();
            assert!(compressed.len() < data.len());
            assert_eq!(zstd::decode_all(&compressed[..]).unwrap(), data.as_bytes());
        }
    }

    #[test]
    fn test_pipe() {
        let data = "row,value\n".repeat(1000);
        let mut out = Vec::new();

        ZstdCompressor::new()
            .with_level(5)
            .pipe(&mut data.as_bytes(), &mut out, 0)
            .unwrap();

        assert_eq!(zstd::decode_all(&out[..]).unwrap(), data.as_bytes());
    }

    #[test]
    fn test_effective_level() {
        assert_eq!(ZstdCompressor::new().effective_level(0), 3);
        assert_eq!(ZstdCompressor::new().effective_level(30), 22);
        assert_eq!(ZstdCompressor::new().with_level(9).effective_level(-1), 9);
    }
}
