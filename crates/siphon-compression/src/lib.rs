//! Response compression middleware for siphon
//!
//! Negotiates a `Content-Encoding` from the client's `Accept-Encoding` and
//! compresses buffered or streamed response bodies with:
//! - brotli (`br`)
//! - gzip
//! - deflate
//! - zstd
//! - lz4 (frame format)
//! - s2 (Snappy-compatible)
//!
//! Features:
//! - Ordered adapter list, first acceptable adapter wins
//! - Per-adapter and global minimum length
//! - Content-type pattern and request skipper
//! - Failing adapters fall through to the next one
//! - Self-tested defaults (brotli, then gzip)
//! - Streaming through any adapter with `pipe` / `pipe_async`

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod codec;
pub mod compressor;
pub mod config;
pub mod error;
pub mod middleware;
pub mod negotiation;

pub use codec::{
    default_compressors, from_encoding, BrotliCompressor, DeflateCompressor, GzipCompressor,
    Lz4Compressor, S2Compressor, S2Mode, ZstdCompressor,
};
pub use compressor::{Compressor, Encoder, DEFAULT_MIN_LENGTH};
pub use config::{CompressionConfig, CompressorConfig, ConfigFormat};
pub use error::CompressionError;
pub use middleware::{CompressionMiddleware, CompressionMiddlewareBuilder, Skipper};
pub use negotiation::{Decision, Negotiator, SkipReason, DEFAULT_CHECKER};
