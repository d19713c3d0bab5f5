//! Negotiation policy
//!
//! Decides whether a buffered response gets compressed and by which adapter.
//! The gates run in a fixed order and the first one that fails ends the
//! decision without touching the response:
//!
//! 1. empty body
//! 2. a non-empty `Content-Encoding` already present
//! 3. body below the minimum length, or content type not matching the checker
//!
//! After that the adapters are tried in their configured order. The first
//! one that accepts the client's `Accept-Encoding` and compresses without
//! error wins; failures fall through to the next adapter.

use crate::compressor::{Compressor, DEFAULT_MIN_LENGTH};
use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, VARY};
use http::{HeaderMap, HeaderValue};
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// Default content-type pattern
pub const DEFAULT_CHECKER: &str = "text|javascript|json";

/// Why a response was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The body is empty
    EmptyBody,
    /// A downstream handler already set `Content-Encoding`
    AlreadyEncoded,
    /// The body is shorter than the minimum length
    TooSmall,
    /// The content type does not match the checker
    NotCompressible,
    /// No adapter accepted the client or every accepting adapter failed
    NotAccepted,
}

impl SkipReason {
    /// Short label used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::EmptyBody => "empty_body",
            SkipReason::AlreadyEncoded => "already_encoded",
            SkipReason::TooSmall => "too_small",
            SkipReason::NotCompressible => "not_compressible",
            SkipReason::NotAccepted => "not_accepted",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`Negotiator::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The body was replaced by its compressed form
    Compressed {
        /// Token written to `Content-Encoding`
        encoding: &'static str,
        /// Body size before compression
        original: usize,
        /// Body size after compression
        compressed: usize,
    },
    /// Nothing was changed
    Skipped(SkipReason),
}

impl Decision {
    /// Token of the winning adapter, if any
    pub fn encoding(&self) -> Option<&'static str> {
        match *self {
            Decision::Compressed { encoding, .. } => Some(encoding),
            Decision::Skipped(_) => None,
        }
    }
}

/// Immutable negotiation settings shared by every request
#[derive(Clone)]
pub struct Negotiator {
    compressors: Arc<[Arc<dyn Compressor>]>,
    min_length: usize,
    checker: Regex,
    level: i32,
}

impl Negotiator {
    /// Create a negotiator over an ordered adapter list
    ///
    /// Uses the default minimum length, checker and level.
    pub fn new(compressors: Vec<Arc<dyn Compressor>>) -> Self {
        Self {
            compressors: compressors.into(),
            min_length: DEFAULT_MIN_LENGTH,
            checker: default_checker(),
            level: 0,
        }
    }

    /// Set the global minimum body size
    #[must_use]
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    /// Set the content-type pattern
    #[must_use]
    pub fn with_checker(mut self, checker: Regex) -> Self {
        self.checker = checker;
        self
    }

    /// Set the level passed to every adapter
    #[must_use]
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Adapters in the order they are tried
    pub fn compressors(&self) -> &[Arc<dyn Compressor>] {
        &self.compressors
    }

    /// Global minimum body size
    pub fn min_length(&self) -> usize {
        self.min_length
    }

    /// Content-type pattern
    pub fn checker(&self) -> &Regex {
        &self.checker
    }

    /// Level passed to adapters
    pub fn level(&self) -> i32 {
        self.level
    }

    /// Run the gates without trying any adapter
    pub fn eligibility(&self, headers: &HeaderMap, body_len: usize) -> Result<(), SkipReason> {
        if body_len == 0 {
            return Err(SkipReason::EmptyBody);
        }
        // an empty value carries no coding
        if headers.get(CONTENT_ENCODING).is_some_and(|v| !v.is_empty()) {
            return Err(SkipReason::AlreadyEncoded);
        }
        if body_len < self.min_length {
            return Err(SkipReason::TooSmall);
        }
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !self.checker.is_match(content_type) {
            return Err(SkipReason::NotCompressible);
        }
        Ok(())
    }

    /// First adapter that accepts the client for a body of `body_size`
    ///
    /// `None` means the size is unknown, so adapter thresholds are skipped.
    pub fn select(
        &self,
        accept_encoding: &str,
        body_size: Option<usize>,
    ) -> Option<(&'static str, &Arc<dyn Compressor>)> {
        self.compressors.iter().find_map(|compressor| {
            compressor
                .accept(accept_encoding, body_size)
                .map(|token| (token, compressor))
        })
    }

    /// Compress `body` in place if the response qualifies
    ///
    /// On success `Content-Encoding` is set, `Content-Length` is rewritten
    /// when present and `Vary: Accept-Encoding` is added. On every other
    /// outcome neither `headers` nor `body` is modified.
    pub fn apply(
        &self,
        accept_encoding: &str,
        headers: &mut HeaderMap,
        body: &mut Bytes,
    ) -> Decision {
        if let Err(reason) = self.eligibility(headers, body.len()) {
            return Decision::Skipped(reason);
        }

        for compressor in self.compressors.iter() {
            let Some(token) = compressor.accept(accept_encoding, Some(body.len())) else {
                continue;
            };

            match compressor.compress(body, self.level) {
                Ok(compressed) => {
                    let original = body.len();
                    let compressed_len = compressed.len();

                    headers.insert(CONTENT_ENCODING, HeaderValue::from_static(token));
                    if headers.contains_key(CONTENT_LENGTH) {
                        headers.insert(CONTENT_LENGTH, HeaderValue::from(compressed_len));
                    }
                    if !varies_on_accept_encoding(headers) {
                        headers.append(VARY, HeaderValue::from_static("Accept-Encoding"));
                    }
                    *body = Bytes::from(compressed);

                    return Decision::Compressed {
                        encoding: token,
                        original,
                        compressed: compressed_len,
                    };
                }
                Err(e) => {
                    warn!(encoding = token, error = %e, "Compressor failed, trying next");
                }
            }
        }

        trace!(accept_encoding, "No compressor accepted the response");
        Decision::Skipped(SkipReason::NotAccepted)
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field(
                "compressors",
                &self.compressors.iter().map(|c| c.encoding()).collect::<Vec<_>>(),
            )
            .field("min_length", &self.min_length)
            .field("checker", &self.checker.as_str())
            .field("level", &self.level)
            .finish()
    }
}

pub(crate) fn default_checker() -> Regex {
    Regex::new(DEFAULT_CHECKER).expect("Invalid regex pattern")
}

fn varies_on_accept_encoding(headers: &HeaderMap) -> bool {
    headers
        .get_all(VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|v| v.trim().eq_ignore_ascii_case("accept-encoding") || v.trim() == "*")
}
