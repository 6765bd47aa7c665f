//! Weir - Programmable HTTP/1.1 Pipeline Server
//!
//! A library framework, not an application: you assemble a [`Pipeline`]
//! of request and response filters, hand it to a [`Server`], and the
//! engine takes care of accepting connections, keep-alive, graceful
//! draining, and hot restart across process generations.
//!
//! ```ignore
//! use weir::{FnRequestFilter, Pipeline, Response, Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut pipeline = Pipeline::new();
//!     pipeline.add_upstream(FnRequestFilter::new(|_req| {
//!         Some(Response::ok("hello world!"))
//!     }));
//!
//!     let server = Server::new(8000, pipeline);
//!     server.listen_and_serve().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod http;
pub mod logger;
pub mod pipeline;
pub mod pool;
pub mod server;

pub use config::EngineConfig;
pub use http::request::{Method, Request, RequestBuilder};
pub use http::response::{Body, Response, ResponseBuilder, StatusCode};
pub use pipeline::context::{RequestContext, StageStat};
pub use pipeline::filter::{FnRequestFilter, FnResponseFilter, RequestFilter, ResponseFilter};
pub use pipeline::{test_with_filter, Pipeline};
pub use pool::BufferPool;
pub use server::{Server, ServerError};
