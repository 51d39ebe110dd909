//! Streaming chat transport.
//!
//! `SseChatTransport` implements the `ChatTransport` port over HTTP
//! server-sent events. All payload-shape normalization happens here, at the
//! transport boundary; everything downstream consumes typed `ServerEvent`s.

pub mod sse;

pub use sse::SseChatTransport;
