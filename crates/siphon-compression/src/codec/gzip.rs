//! gzip adapter backed by flate2

use crate::compressor::{resolve_level, Compressor, Encoder, DEFAULT_MIN_LENGTH};
use crate::error::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Write};

/// Content-Encoding token for gzip
pub const GZIP_ENCODING: &str = "gzip";

const MAX_GZIP_LEVEL: i32 = 9;
const DEFAULT_GZIP_LEVEL: i32 = 6;

/// gzip compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GzipCompressor {
    level: i32,
    min_length: usize,
}

impl GzipCompressor {
    /// Create a gzip compressor with the default level and threshold
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
        let level = resolve_level(requested, self.level, DEFAULT_GZIP_LEVEL, MAX_GZIP_LEVEL);
        Compression::new(level as u32)
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for GzipCompressor {
    fn encoding(&self) -> &'static str {
        GZIP_ENCODING
    }

    fn min_length(&self) -> usize {
        self.min_length
    }

    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(
            Vec::with_capacity(data.len() / 2),
            self.compression(level),
        );
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn encoder<'a>(
        &self,
        writer: &'a mut dyn Write,
        level: i32,
    ) -> io::Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(GzEncoder::new(writer, self.compression(level))))
    }
}

impl<W: Write> Encoder for GzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        GzEncoder::finish(*self).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_accept() {
        let gzip = GzipCompressor::new();
        assert_eq!(gzip.accept("gzip, deflate, br", Some(1024)), Some(GZIP_ENCODING));
        assert_eq!(gzip.accept("gzip", Some(1023)), None);
        assert_eq!(gzip.accept("gzip", None), Some(GZIP_ENCODING));
        assert_eq!(gzip.accept("br", Some(4096)), None);
    }

    #[test]
    fn test_compress_round_trip_across_levels() {
        let data = "{\"name\":\"siphon\",\"tags\":[\"gzip\",\"json\"]}".repeat(64);
        let gzip = GzipCompressor::new();

        for level in [0, 1, 6, 9, 42, -1] {
            let compressed = gzip.compress(data.as_bytes(), level).unwrap();
            assert!(compressed.len() < data.len(), "level {level} did not shrink");
            assert_eq!(gunzip(&compressed), data.as_bytes());
        }
    }

    #[test]
    fn test_configured_level_is_used_for_zero() {
        let data = "abcdefghij".repeat(500);
        let fast = GzipCompressor::new().with_level(1);
        let best = GzipCompressor::new().with_level(9);

        let fast_out = fast.compress(data.as_bytes(), 0).unwrap();
        assert_eq!(fast_out, fast.compress(data.as_bytes(), 1).unwrap());
        assert_eq!(gunzip(&best.compress(data.as_bytes(), 0).unwrap()), data.as_bytes());
    }

    #[test]
    fn test_pipe() {
        let data = "streamed body line\n".repeat(300);
        let mut out = Vec::new();

        let copied = GzipCompressor::new()
            .pipe(&mut data.as_bytes(), &mut out, 0)
            .unwrap();

        assert_eq!(copied as usize, data.len());
        assert_eq!(gunzip(&out), data.as_bytes());
    }

    #[test]
    fn test_min_length_builder() {
        let gzip = GzipCompressor::new().with_min_length(10);
        assert_eq!(gzip.min_length(), 10);
        assert_eq!(gzip.accept("gzip", Some(10)), Some(GZIP_ENCODING));
    }
}
