//! Brotli adapter
//!
//! Brotli gives the best ratio of the default codecs, at a higher CPU cost.
//! Quality runs from 1 to 11; anything above is clamped and zero or below
//! falls back to the configured quality, then to 6.

use crate::compressor::{resolve_level, Compressor, Encoder, DEFAULT_MIN_LENGTH};
use crate::error::Result;
use brotli::CompressorWriter;
use std::io::{self, Write};

/// Content-Encoding token for brotli
pub const BROTLI_ENCODING: &str = "br";

const MAX_BROTLI_QUALITY: i32 = 11;
const DEFAULT_BROTLI_QUALITY: i32 = 6;
const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_LG_WINDOW: u32 = 22;

/// Brotli compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrotliCompressor {
    level: i32,
    min_length: usize,
}

impl BrotliCompressor {
    /// Create a brotli compressor with the default quality and threshold
    pub fn new() -> Self {
        Self {
            level: 0,
            min_length: DEFAULT_MIN_LENGTH,
        }
    }

    /// Set the quality used when a call passes zero
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

    /// Effective quality for a call
    pub fn quality(&self, requested: i32) -> u32 {
        resolve_level(
            requested,
            self.level,
            DEFAULT_BROTLI_QUALITY,
            MAX_BROTLI_QUALITY,
        ) as u32
    }

    fn writer<W: Write>(&self, inner: W, requested: i32) -> CompressorWriter<W> {
        CompressorWriter::new(
            inner,
            BROTLI_BUFFER_SIZE,
            self.quality(requested),
            BROTLI_LG_WINDOW,
        )
    }
}

impl Default for BrotliCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for BrotliCompressor {
    fn encoding(&self) -> &'static str {
        BROTLI_ENCODING
    }

    fn min_length(&self) -> usize {
        self.min_length
    }

    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        let mut writer = self.writer(Vec::with_capacity(data.len() / 2), level);
        writer.write_all(data)?;
        writer.flush()?;
        Ok(writer.into_inner())
    }

    fn encoder<'a>(
        &self,
        writer: &'a mut dyn Write,
        level: i32,
    ) -> io::Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(BrotliEncoder {
            writer: self.writer(RecordingWriter::new(writer), level),
        }))
    }
}

/// Destination wrapper that keeps the first write failure
///
/// `CompressorWriter::into_inner` writes the final metablock but drops the
/// result, so the failure is read back from here instead.
struct RecordingWriter<W> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: Write> RecordingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    fn record<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result {
            if self.error.is_none() {
                self.error = Some(io::Error::new(e.kind(), e.to_string()));
            }
        }
        result
    }
}

impl<W: Write> Write for RecordingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);
        self.record(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.inner.flush();
        self.record(result)
    }
}

/// Streaming brotli encoder
struct BrotliEncoder<W: Write> {
    writer: CompressorWriter<RecordingWriter<W>>,
}

impl<W: Write> Write for BrotliEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl<W: Write> Encoder for BrotliEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut writer = self.writer;
        writer.flush()?;
        // into_inner writes the last metablock
        let destination = writer.into_inner();
        match destination.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
