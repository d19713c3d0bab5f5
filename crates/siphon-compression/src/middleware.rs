//! Compression middleware implementation

use crate::codec;
use crate::compressor::{Compressor, DEFAULT_MIN_LENGTH};
use crate::config::CompressionConfig;
use crate::negotiation::{default_checker, Decision, Negotiator};
use async_trait::async_trait;
use http::header::ACCEPT_ENCODING;
use http::{Request, Response};
use http_body_util::BodyExt;
use regex::Regex;
use siphon_core::middleware::{Body, Middleware, Next};
use siphon_core::Result;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Predicate that bypasses compression for a request
pub type Skipper = Arc<dyn Fn(&Request<Body>) -> bool + Send + Sync>;

/// Compression middleware
///
/// Runs the downstream chain, then hands the buffered response to a
/// [`Negotiator`]. Downstream errors are returned as they are.
#[derive(Clone)]
pub struct CompressionMiddleware {
    negotiator: Arc<Negotiator>,
    skipper: Option<Skipper>,
}

impl CompressionMiddleware {
    /// Create a middleware with the default settings and adapters
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a middleware
    pub fn builder() -> CompressionMiddlewareBuilder {
        CompressionMiddlewareBuilder::default()
    }

    /// Build a middleware from configuration
    pub fn from_config(config: &CompressionConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self::builder()
            .level(config.level)
            .min_length(config.min_length)
            .checker(config.checker_regex()?)
            .compressors(config.build_compressors()?)
            .build())
    }

    /// Negotiation settings in use
    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    /// Stream `reader` into `writer`, compressed when the client allows it
    ///
    /// The body size is unknown here, so adapter thresholds do not apply.
    /// Returns the token of the adapter used, or `None` when the bytes were
    /// copied through unchanged.
    pub fn pipe(
        &self,
        accept_encoding: &str,
        reader: &mut dyn Read,
        writer: &mut dyn Write,
    ) -> io::Result<Option<&'static str>> {
        match self.negotiator.select(accept_encoding, None) {
            Some((token, compressor)) => {
                let copied = compressor.pipe(reader, writer, self.negotiator.level())?;
                debug!(encoding = token, original = copied, "Stream compressed");
                Ok(Some(token))
            }
            None => {
                io::copy(reader, writer)?;
                Ok(None)
            }
        }
    }

    /// Async variant of [`pipe`](Self::pipe)
    ///
    /// The copy runs on the blocking pool. `writer` is flushed and handed
    /// back once the stream is finished. Dropping the returned future stops
    /// the copy at its next read or write with `ConnectionAborted`.
    pub async fn pipe_async<R, W>(
        &self,
        accept_encoding: &str,
        reader: R,
        writer: W,
    ) -> io::Result<(Option<&'static str>, W)>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let selected = self
            .negotiator
            .select(accept_encoding, None)
            .map(|(token, compressor)| (token, Arc::clone(compressor)));
        let level = self.negotiator.level();

        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let mut reader = Cancellable::new(SyncIoBridge::new(reader), cancel.clone());
        let mut writer = Cancellable::new(SyncIoBridge::new(writer), cancel);

        tokio::task::spawn_blocking(move || {
            let token = match selected {
                Some((token, compressor)) => {
                    compressor.pipe(&mut reader, &mut writer, level)?;
                    Some(token)
                }
                None => {
                    io::copy(&mut reader, &mut writer)?;
                    None
                }
            };
            writer.flush()?;
            Ok::<_, io::Error>((token, writer.inner.into_inner()))
        })
        .await
        .map_err(io::Error::other)?
    }
}

/// Sync stream that fails once its token is cancelled
struct Cancellable<T> {
    inner: T,
    cancel: CancellationToken,
}

impl<T> Cancellable<T> {
    fn new(inner: T, cancel: CancellationToken) -> Self {
        Self { inner, cancel }
    }

    fn check(&self) -> io::Result<()> {
        // not Interrupted, io::copy retries those
        if self.cancel.is_cancelled() {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "stream cancelled",
            ));
        }
        Ok(())
    }
}

impl<T: Read> Read for Cancellable<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.read(buf)
    }
}

impl<T: Write> Write for Cancellable<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()?;
        self.inner.flush()
    }
}

impl Default for CompressionMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompressionMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionMiddleware")
            .field("negotiator", &self.negotiator)
            .field("has_skipper", &self.skipper.is_some())
            .finish()
    }
}

#[async_trait]
impl Middleware for CompressionMiddleware {
    async fn call(&self, req: Request<Body>, next: Next) -> Result<Response<Body>> {
        if self.skipper.as_ref().is_some_and(|skip| skip(&req)) {
            return next.run(req).await;
        }

        let accept_encoding = req
            .headers()
            .get(ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();

        let response = next.run(req).await?;

        let (mut parts, body) = response.into_parts();
        let mut bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };

        match self
            .negotiator
            .apply(&accept_encoding, &mut parts.headers, &mut bytes)
        {
            Decision::Compressed {
                encoding,
                original,
                compressed,
            } => {
                debug!(encoding, original, compressed, "Response compressed");
            }
            Decision::Skipped(reason) => {
                debug!(reason = reason.as_str(), "Response not compressed");
            }
        }

        Ok(Response::from_parts(parts, Body::new(bytes)))
    }
}

/// Builder for [`CompressionMiddleware`]
#[derive(Default)]
pub struct CompressionMiddlewareBuilder {
    level: i32,
    min_length: Option<usize>,
    checker: Option<Regex>,
    compressors: Option<Vec<Arc<dyn Compressor>>>,
    skipper: Option<Skipper>,
}

impl CompressionMiddlewareBuilder {
    /// Level passed to every adapter
    pub fn level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Global minimum body size
    pub fn min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self
    }

    /// Content-type pattern
    pub fn checker(mut self, checker: Regex) -> Self {
        self.checker = Some(checker);
        self
    }

    /// Append one adapter to the list
    pub fn compressor<C: Compressor + 'static>(mut self, compressor: C) -> Self {
        self.compressors
            .get_or_insert_with(Vec::new)
            .push(Arc::new(compressor));
        self
    }

    /// Replace the adapter list
    pub fn compressors(mut self, compressors: Vec<Arc<dyn Compressor>>) -> Self {
        self.compressors = Some(compressors);
        self
    }

    /// Bypass compression for requests matching `skipper`
    pub fn skipper<F>(mut self, skipper: F) -> Self
    where
        F: Fn(&Request<Body>) -> bool + Send + Sync + 'static,
    {
        self.skipper = Some(Arc::new(skipper));
        self
    }

    /// Build the middleware
    ///
    /// Without adapters the defaults are registered, brotli only if its
    /// self-test passes.
    pub fn build(self) -> CompressionMiddleware {
        let min_length = self.min_length.unwrap_or(DEFAULT_MIN_LENGTH);
        let compressors = self
            .compressors
            .unwrap_or_else(|| codec::default_compressors(self.level, min_length));

        let negotiator = Negotiator::new(compressors)
            .with_min_length(min_length)
            .with_checker(self.checker.unwrap_or_else(default_checker))
            .with_level(self.level);

        CompressionMiddleware {
            negotiator: Arc::new(negotiator),
            skipper: self.skipper,
        }
    }
}

impl fmt::Debug for CompressionMiddlewareBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionMiddlewareBuilder")
            .field("level", &self.level)
            .field("min_length", &self.min_length)
            .field("checker", &self.checker.as_ref().map(Regex::as_str))
            .field(
                "compressors",
                &self
                    .compressors
                    .as_ref()
                    .map(|list| list.iter().map(|c| c.encoding()).collect::<Vec<_>>()),
            )
            .field("has_skipper", &self.skipper.is_some())
            .finish()
    }
}
