//! # Siphon Core
//!
//! Core types, traits, and error handling shared by the siphon crates.
//!
//! This crate provides the host-side abstractions the compression
//! middleware plugs into:
//! - Middleware trait and the `Next` chain
//! - Buffered body type
//! - Error types

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod error;
pub mod middleware;

pub use error::{Error, Result};
pub use middleware::{Body, HandlerFn, HandlerFuture, Middleware, Next};

// Re-export commonly used HTTP types
pub use bytes::Bytes;
pub use http::{Request, Response, StatusCode};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::middleware::{Body, Middleware, Next};
}
