//! End-to-end tests for the compression pipeline

use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, VARY};
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use proptest::prelude::*;
use siphon_compression::{
    from_encoding, CompressionConfig, CompressionMiddleware, Compressor, ConfigFormat,
    GzipCompressor,
};
use siphon_core::{Body, Error, HandlerFn, HandlerFuture, Middleware, Next};
use std::io::{self, Read, Write};
use std::sync::Arc;

const ENCODINGS: &[&str] = &["br", "gzip", "deflate", "zstd", "lz4", "s2"];

fn decompress(encoding: &str, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    match encoding {
        "br" => {
            brotli::Decompressor::new(data, 4096)
                .read_to_end(&mut out)
                .unwrap();
        }
        "gzip" => {
            flate2::read::GzDecoder::new(data)
                .read_to_end(&mut out)
                .unwrap();
        }
        "deflate" => {
            flate2::read::DeflateDecoder::new(data)
                .read_to_end(&mut out)
                .unwrap();
        }
        "zstd" => out = zstd::decode_all(data).unwrap(),
        "lz4" => {
            lz4_flex::frame::FrameDecoder::new(data)
                .read_to_end(&mut out)
                .unwrap();
        }
        "s2" => out = snap::raw::Decoder::new().decompress_vec(data).unwrap(),
        other => panic!("no decoder for {other}"),
    }
    out
}

fn decompress_stream(encoding: &str, data: &[u8]) -> Vec<u8> {
    if encoding == "s2" {
        let mut out = Vec::new();
        snap::read::FrameDecoder::new(data)
            .read_to_end(&mut out)
            .unwrap();
        return out;
    }
    decompress(encoding, data)
}

fn json_payload(len: usize) -> Bytes {
    let record = r#"{"id":42,"name":"siphon","tags":["a","b"]},"#;
    let mut body = String::from("[");
    while body.len() + record.len() < len {
        body.push_str(record);
    }
    body.push_str(&" ".repeat(len - body.len() - 1));
    body.push(']');
    Bytes::from(body)
}

fn serve(body: Bytes, content_type: &'static str) -> Next {
    let handler: HandlerFn = Box::new(move |_req| {
        let body = body.clone();
        Box::pin(async move {
            Ok::<_, Error>(
                Response::builder()
                    .header(CONTENT_TYPE, content_type)
                    .header(CONTENT_LENGTH, body.len())
                    .body(Body::new(body))
                    .unwrap(),
            )
        }) as HandlerFuture
    });
    Next::with_handler(Arc::new([]), handler)
}

fn get(accept_encoding: &str) -> Request<Body> {
    Request::builder()
        .uri("/api/items")
        .header(ACCEPT_ENCODING, accept_encoding)
        .body(Body::default())
        .unwrap()
}

async fn into_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

#[tokio::test]
async fn test_json_2000_bytes_gzip() {
    let middleware = CompressionMiddleware::builder()
        .compressor(GzipCompressor::new().with_min_length(1024))
        .build();
    let original = json_payload(2000);

    let response = middleware
        .call(get("gzip"), serve(original.clone(), "application/json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(CONTENT_ENCODING).unwrap(), "gzip");
    assert_eq!(response.headers().get(VARY).unwrap(), "Accept-Encoding");

    let declared: usize = response.headers()[CONTENT_LENGTH]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    let body = into_bytes(response).await;
    assert_eq!(declared, body.len());
    assert_eq!(decompress("gzip", &body), original);
}

#[tokio::test]
async fn test_json_500_bytes_untouched() {
    let middleware = CompressionMiddleware::builder()
        .compressor(GzipCompressor::new().with_min_length(1024))
        .build();
    let original = json_payload(500);

    let response = middleware
        .call(get("gzip"), serve(original.clone(), "application/json"))
        .await
        .unwrap();

    assert!(!response.headers().contains_key(CONTENT_ENCODING));
    assert!(!response.headers().contains_key(VARY));
    assert_eq!(response.headers()[CONTENT_LENGTH], "500");
    assert_eq!(into_bytes(response).await, original);
}

#[tokio::test]
async fn test_png_untouched() {
    let middleware = CompressionMiddleware::builder()
        .compressor(GzipCompressor::new())
        .build();
    let original = Bytes::from(vec![0u8; 2000]);

    let response = middleware
        .call(get("gzip"), serve(original.clone(), "image/png"))
        .await
        .unwrap();

    assert!(!response.headers().contains_key(CONTENT_ENCODING));
    assert_eq!(into_bytes(response).await, original);
}

#[tokio::test]
async fn test_handler_encoded_response_untouched() {
    let middleware = CompressionMiddleware::new();
    let handler: HandlerFn = Box::new(|_req| {
        Box::pin(async {
            Ok::<_, Error>(
                Response::builder()
                    .header(CONTENT_TYPE, "text/plain")
                    .header(CONTENT_ENCODING, "identity")
                    .body(Body::from("x".repeat(5000)))
                    .unwrap(),
            )
        }) as HandlerFuture
    });

    let response = middleware
        .call(get("br, gzip"), Next::with_handler(Arc::new([]), handler))
        .await
        .unwrap();

    assert_eq!(response.headers().get(CONTENT_ENCODING).unwrap(), "identity");
    assert_eq!(into_bytes(response).await.len(), 5000);
}

#[tokio::test]
async fn test_two_compression_layers_compress_once() {
    let layer = || -> Arc<dyn Middleware> {
        Arc::new(
            CompressionMiddleware::builder()
                .compressor(GzipCompressor::new())
                .build(),
        )
    };
    let original = json_payload(3000);
    let body = original.clone();
    let handler: HandlerFn = Box::new(move |_req| {
        let body = body.clone();
        Box::pin(async move {
            Ok::<_, Error>(
                Response::builder()
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::new(body))
                    .unwrap(),
            )
        }) as HandlerFuture
    });
    let next = Next::with_handler(Arc::new([layer(), layer()]), handler);

    let response = next.run(get("gzip")).await.unwrap();

    assert_eq!(response.headers().get_all(CONTENT_ENCODING).iter().count(), 1);
    assert_eq!(decompress("gzip", &into_bytes(response).await), original);
}

#[tokio::test]
async fn test_handler_error_passes_through() {
    let middleware = CompressionMiddleware::new();
    let next = Next::handler(|_req| async {
        Err::<Response<Body>, _>(Error::Handler("connection refused".to_string()))
    });

    let err = middleware.call(get("gzip"), next).await.unwrap_err();
    assert_eq!(err.to_status_code(), StatusCode::BAD_GATEWAY);
    assert!(matches!(err, Error::Handler(ref m) if m == "connection refused"));
}

#[tokio::test]
async fn test_configured_order_wins() {
    let yaml = r#"
min_length: 64
compressors:
  - encoding: lz4
  - encoding: br
  - encoding: gzip
"#;
    let config = siphon_compression::config::load_from_str(yaml, ConfigFormat::Yaml).unwrap();
    let middleware = CompressionMiddleware::from_config(&config).unwrap();
    let original = json_payload(4096);

    let response = middleware
        .call(get("gzip, br, lz4"), serve(original.clone(), "text/plain"))
        .await
        .unwrap();
    assert_eq!(response.headers().get(CONTENT_ENCODING).unwrap(), "lz4");
    assert_eq!(decompress("lz4", &into_bytes(response).await), original);

    let response = middleware
        .call(get("gzip, br"), serve(original.clone(), "text/plain"))
        .await
        .unwrap();
    assert_eq!(response.headers().get(CONTENT_ENCODING).unwrap(), "br");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_middleware_across_tasks() {
    let middleware = Arc::new(CompressionMiddleware::builder().min_length(256).build());
    let original = json_payload(8192);

    let tasks: Vec<_> = ["br", "gzip", "br, gzip", "identity"]
        .into_iter()
        .cycle()
        .take(32)
        .map(|accept| {
            let middleware = Arc::clone(&middleware);
            let original = original.clone();
            tokio::spawn(async move {
                let response = middleware
                    .call(get(accept), serve(original.clone(), "application/json"))
                    .await
                    .unwrap();
                let encoding = response
                    .headers()
                    .get(CONTENT_ENCODING)
                    .map(|v| v.to_str().unwrap().to_string());
                let body = into_bytes(response).await;
                match encoding {
                    Some(enc) => assert_eq!(decompress(&enc, &body), original),
                    None => assert_eq!(body, original),
                }
                (accept, body.len() < original.len())
            })
        })
        .collect();

    for task in tasks {
        let (accept, compressed) = task.await.unwrap();
        assert_eq!(compressed, accept != "identity", "{accept}");
    }
}

#[test]
fn test_pipe_through_every_adapter() {
    let data = json_payload(64 * 1024);

    for encoding in ENCODINGS {
        let middleware = CompressionMiddleware::builder()
            .compressors(vec![from_encoding(encoding, 0, 1024).unwrap()])
            .build();
        let mut out = Vec::new();

        let token = middleware.pipe(encoding, &mut &data[..], &mut out).unwrap();

        assert_eq!(token, Some(*encoding));
        assert_eq!(decompress_stream(encoding, &out), data, "{encoding}");
    }
}

#[test]
fn test_default_config_builds_brotli_first() {
    let middleware = CompressionMiddleware::from_config(&CompressionConfig::default()).unwrap();
    let tokens: Vec<_> = middleware
        .negotiator()
        .compressors()
        .iter()
        .map(|c| c.encoding())
        .collect();
    assert_eq!(tokens, vec!["br", "gzip"]);
}

/// Destination that takes `budget` bytes and then fails
struct ShortWriter {
    budget: usize,
    written: Vec<u8>,
}

impl ShortWriter {
    fn new(budget: usize) -> Self {
        Self {
            budget,
            written: Vec::new(),
        }
    }
}

impl Write for ShortWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
        }
        let n = buf.len().min(self.budget);
        self.budget -= n;
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_pipe_reports_write_errors_for_every_adapter() {
    let data = json_payload(64 * 1024);

    for budget in [0, 8] {
        for encoding in ENCODINGS {
            let compressor = from_encoding(encoding, 0, 0).unwrap();
            let mut out = ShortWriter::new(budget);

            let result = compressor.pipe(&mut &data[..], &mut out, 0);

            let err = result.expect_err(encoding);
            assert_eq!(err.kind(), io::ErrorKind::BrokenPipe, "{encoding}");
            assert!(out.written.len() <= budget);
        }
    }
}

#[test]
fn test_middleware_pipe_reports_write_errors() {
    let middleware = CompressionMiddleware::new();
    let data = json_payload(16 * 1024);

    for accept in ["br", "gzip", "identity"] {
        let mut out = ShortWriter::new(4);
        assert!(middleware.pipe(accept, &mut &data[..], &mut out).is_err(), "{accept}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_round_trip_every_adapter(
        data in proptest::collection::vec(any::<u8>(), 0..4096),
        level in -2i32..40,
    ) {
        for encoding in ENCODINGS {
            let compressor = from_encoding(encoding, 0, 0).unwrap();
            let compressed = compressor.compress(&data, level).unwrap();
            prop_assert_eq!(
                &decompress(encoding, &compressed),
                &data,
                "{} at level {}",
                encoding,
                level
            );
        }
    }

    #[test]
    fn prop_small_bodies_never_compressed(len in 1usize..1024) {
        let negotiator = CompressionMiddleware::builder()
            .compressor(GzipCompressor::new().with_min_length(0))
            .build()
            .negotiator()
            .clone();
        let original = json_payload(len.max(2));
        let mut headers = http::HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        let mut body = original.clone();

        let decision = negotiator.apply("gzip", &mut headers, &mut body);

        prop_assert!(decision.encoding().is_none());
        prop_assert!(!headers.contains_key(CONTENT_ENCODING));
        prop_assert_eq!(body, original);
    }
}
