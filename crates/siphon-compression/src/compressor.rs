//! Codec adapter contract
//!
//! Every compression backend is exposed through [`Compressor`]: a token used
//! for negotiation, a size threshold, a buffered `compress` and a streaming
//! `pipe`. Adapters hold only their configured level and threshold, so one
//! instance is shared by every request.

use crate::error::Result;
use std::fmt;
use std::io::{self, Read, Write};

/// Default minimum body size (bytes) worth compressing
pub const DEFAULT_MIN_LENGTH: usize = 1024;

/// Payload compressed by [`Compressor::probe`]
const PROBE_PAYLOAD: &[u8] = b"{\"probe\":\"siphon\",\"probe_again\":\"siphon\"}";

/// Streaming encoder opened by [`Compressor::encoder`]
///
/// Writes go through the codec into the borrowed destination. `finish`
/// consumes the encoder and writes the codec trailer, so it can only run once.
pub trait Encoder: Write {
    /// Flush pending data and write the end-of-stream marker
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// A compression algorithm behind the uniform negotiation contract
pub trait Compressor: Send + Sync + fmt::Debug {
    /// Canonical token used in `Accept-Encoding` and `Content-Encoding`
    fn encoding(&self) -> &'static str;

    /// Bodies smaller than this are refused
    fn min_length(&self) -> usize;

    /// Check whether this adapter can serve a client
    ///
    /// `body_size` is `None` when the size is unknown (streaming), in which
    /// case the threshold is not applied. Returns the token to put in
    /// `Content-Encoding` when acceptable.
    fn accept(&self, accept_encoding: &str, body_size: Option<usize>) -> Option<&'static str> {
        if body_size.is_some_and(|size| size < self.min_length()) {
            return None;
        }
        accept_encoding_contains(accept_encoding, self.encoding())
    }

    /// Compress a whole buffer
    ///
    /// A `level` of zero or below falls back to the adapter's configured
    /// level; values above the codec maximum are clamped.
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>>;

    /// Open a streaming encoder writing into `writer`
    fn encoder<'a>(&self, writer: &'a mut dyn Write, level: i32)
        -> io::Result<Box<dyn Encoder + 'a>>;

    /// Stream `reader` through the codec into `writer`
    ///
    /// The encoder is finished on every exit path, including read and write
    /// failures, so the destination never ends in the middle of a frame that
    /// the codec could still close. The copy error wins over a finish error.
    /// Returns the number of uncompressed bytes read.
    fn pipe(&self, reader: &mut dyn Read, writer: &mut dyn Write, level: i32) -> io::Result<u64> {
        let mut encoder = self.encoder(writer, level)?;
        let copied = io::copy(reader, &mut encoder);
        let finished = encoder.finish();
        let copied = copied?;
        finished?;
        Ok(copied)
    }

    /// Self-test run before an adapter is registered
    fn probe(&self) -> Result<()> {
        self.compress(PROBE_PAYLOAD, 0).map(drop)
    }
}

/// Check whether the client's `Accept-Encoding` value lists `encoding`
///
/// Matching is a plain case-sensitive substring test on the raw header value.
pub fn accept_encoding_contains(
    accept_encoding: &str,
    encoding: &'static str,
) -> Option<&'static str> {
    accept_encoding.contains(encoding).then_some(encoding)
}

/// Pick the effective level for a call
///
/// `requested` wins when positive, then `configured`, then `default`; the
/// result is clamped to `1..=max`.
pub(crate) fn resolve_level(requested: i32, configured: i32, default: i32, max: i32) -> i32 {
    let level = if requested > 0 {
        requested
    } else if configured > 0 {
        configured
    } else {
        default
    };
    level.clamp(1, max)
}
