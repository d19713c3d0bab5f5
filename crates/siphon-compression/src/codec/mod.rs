//! Codec adapters
//!
//! One module per algorithm, each wrapping an ecosystem crate behind
//! [`Compressor`](crate::compressor::Compressor).

mod brotli;
mod deflate;
mod gzip;
mod lz4;
mod s2;
mod zstd;

pub use self::brotli::{BrotliCompressor, BROTLI_ENCODING};
pub use self::deflate::{DeflateCompressor, DEFLATE_ENCODING};
pub use self::gzip::{GzipCompressor, GZIP_ENCODING};
pub use self::lz4::{Lz4Compressor, LZ4_ENCODING};
pub use self::s2::{S2Compressor, S2Mode, S2_ENCODING};
pub use self::zstd::{ZstdCompressor, ZSTD_ENCODING};

use crate::compressor::Compressor;
use std::sync::Arc;
use tracing::{debug, warn};

/// Every token an adapter exists for
pub const SUPPORTED_ENCODINGS: &[&str] = &[
    BROTLI_ENCODING,
    GZIP_ENCODING,
    DEFLATE_ENCODING,
    ZSTD_ENCODING,
    LZ4_ENCODING,
    S2_ENCODING,
];

/// Build the adapter registered under `encoding`
///
/// Returns `None` for tokens no adapter exists for.
pub fn from_encoding(encoding: &str, level: i32, min_length: usize) -> Option<Arc<dyn Compressor>> {
    let compressor: Arc<dyn Compressor> = match encoding {
        BROTLI_ENCODING => Arc::new(
            BrotliCompressor::new()
                .with_level(level)
                .with_min_length(min_length),
        ),
        GZIP_ENCODING => Arc::new(
            GzipCompressor::new()
                .with_level(level)
                .with_min_length(min_length),
        ),
        DEFLATE_ENCODING => Arc::new(
            DeflateCompressor::new()
                .with_level(level)
                .with_min_length(min_length),
        ),
        ZSTD_ENCODING => Arc::new(
            ZstdCompressor::new()
                .with_level(level)
                .with_min_length(min_length),
        ),
        LZ4_ENCODING => Arc::new(
            Lz4Compressor::new()
                .with_level(level)
                .with_min_length(min_length),
        ),
        S2_ENCODING => Arc::new(S2Compressor::new().with_level(level).with_min_length(min_length)),
        _ => return None,
    };
    Some(compressor)
}

/// Adapters used when no list is configured
///
/// brotli goes first but is only registered when its self-test passes;
/// gzip is always registered.
pub fn default_compressors(level: i32, min_length: usize) -> Vec<Arc<dyn Compressor>> {
    default_compressors_with(
        Arc::new(
            BrotliCompressor::new()
                .with_level(level)
                .with_min_length(min_length),
        ),
        Arc::new(
            GzipCompressor::new()
                .with_level(level)
                .with_min_length(min_length),
        ),
    )
}

/// `preferred` if it passes its self-test, then `fallback` unconditionally
pub(crate) fn default_compressors_with(
    preferred: Arc<dyn Compressor>,
    fallback: Arc<dyn Compressor>,
) -> Vec<Arc<dyn Compressor>> {
    let mut compressors: Vec<Arc<dyn Compressor>> = Vec::with_capacity(2);
    register_if_healthy(&mut compressors, preferred);
    compressors.push(fallback);

    debug!(
        encodings = ?compressors.iter().map(|c| c.encoding()).collect::<Vec<_>>(),
        "Registered default compressors"
    );
    compressors
}

/// Push `candidate` only when its self-test round-trip succeeds
fn register_if_healthy(
    compressors: &mut Vec<Arc<dyn Compressor>>,
    candidate: Arc<dyn Compressor>,
) -> bool {
    match candidate.probe() {
        Ok(()) => {
            compressors.push(candidate);
            true
        }
        Err(e) => {
            warn!(
                encoding = candidate.encoding(),
                error = %e,
                "Self-test failed, not registering compressor"
            );
            false
        }
    }
}
