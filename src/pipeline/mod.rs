//! Request pipeline.
//!
//! A pipeline is an ordered pair of filter chains. Upstream filters see
//! the request in order until one of them produces a response; downstream
//! filters then see the request and the response, in order, and may
//! mutate the response before it is written. Every stage is timed and
//! folded into the request signature.

pub mod context;
pub mod filter;

use std::sync::Arc;

use crate::http::request::Request;
use crate::http::response::Response;
use crate::pipeline::context::RequestContext;
use crate::pipeline::filter::{RequestFilter, ResponseFilter};

/// Ordered upstream and downstream filter chains plus an optional
/// completion callback.
///
/// The chains are append-only after assembly. Filters are stored behind
/// `Arc` so one pipeline can serve every connection concurrently.
pub struct Pipeline {
    pub upstream: Vec<Arc<dyn RequestFilter>>,
    pub downstream: Vec<Arc<dyn ResponseFilter>>,
    /// Invoked on its own task once a request is fully written and
    /// finalized; the return value is ignored.
    pub request_done: Option<Arc<dyn RequestFilter>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            upstream: Vec::new(),
            downstream: Vec::new(),
            request_done: None,
        }
    }

    /// Appends a request filter to the upstream chain.
    pub fn add_upstream<F: RequestFilter + 'static>(&mut self, filter: F) {
        self.upstream.push(Arc::new(filter));
    }

    /// Appends a response filter to the downstream chain.
    pub fn add_downstream<F: ResponseFilter + 'static>(&mut self, filter: F) {
        self.downstream.push(Arc::new(filter));
    }

    /// Sets the request-done callback.
    pub fn on_done<F: RequestFilter + 'static>(&mut self, filter: F) {
        self.request_done = Some(Arc::new(filter));
    }

    /// Runs the request through both chains and returns the response.
    ///
    /// Upstream filters run in order, each under its own timed stage;
    /// the first one to return a response ends the upstream traversal.
    /// If none does, a plain 404 is synthesized. Downstream filters then
    /// all run, also under timed stages, with the response passed by
    /// mutable reference.
    pub fn execute(&self, req: &mut RequestContext) -> Response {
        let mut response = None;

        for f in &self.upstream {
            req.start_stage(f.name());
            let res = f.filter_request(req);
            req.finish_stage();
            if res.is_some() {
                response = res;
                break;
            }
        }

        let mut response = response.unwrap_or_else(Response::not_found);

        for f in &self.downstream {
            req.start_stage(f.name());
            f.filter_response(req, &mut response);
            req.finish_stage();
        }

        response
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a single filter against a request and returns the finalized
/// record together with the filter's response.
///
/// The stage stats in the returned record are complete; the record has
/// no connection and no remote address. This is the unit-test harness
/// for filters.
pub fn test_with_filter(
    request: Request,
    filter: &dyn RequestFilter,
) -> (RequestContext, Option<Response>) {
    let mut req = RequestContext::new(request);
    req.start_stage(filter.name());
    let res = filter.filter_request(&mut req);
    req.finish_stage();
    req.finish();
    (req, res)
}
