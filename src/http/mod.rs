//! HTTP/1.1 wire layer.
//!
//! The engine carries its own small HTTP/1.1 implementation: a request
//! parser that works incrementally over pooled read buffers, a response
//! model with fixed and streaming bodies, and a writer that normalizes
//! framing before anything hits the socket.
//!
//! # Submodules
//!
//! - **`request`**: request representation and builder
//! - **`parser`**: slice-level parsing plus `read_request` over a pool entry
//! - **`response`**: status codes, bodies, builder, response helpers
//! - **`writer`**: framing normalization and serialization
//!
//! Keep-alive is deliberately conservative: a connection is reused only
//! when the request carries the literal header `Connection: Keep-Alive`.

pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
