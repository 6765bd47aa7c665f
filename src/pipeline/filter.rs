use crate::http::response::Response;
use crate::pipeline::context::RequestContext;

/// Transforms incoming requests and may short-circuit the pipeline.
///
/// Filters are chained in order; returning `Some(response)` ends the
/// upstream traversal with that response, returning `None` passes the
/// request to the next filter. Filters are shared across connections and
/// must be safe for concurrent invocation.
pub trait RequestFilter: Send + Sync {
    fn filter_request(&self, req: &mut RequestContext) -> Option<Response>;

    /// Identity used as the stage name in request stats.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Observes and may mutate outgoing responses.
///
/// Downstream filters run once a response exists; mutating the request
/// record at this point has no effect on the response that was already
/// produced.
pub trait ResponseFilter: Send + Sync {
    fn filter_response(&self, req: &mut RequestContext, res: &mut Response);

    /// Identity used as the stage name in request stats.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Wraps a bare function as a [`RequestFilter`].
///
/// ```ignore
/// let filter = FnRequestFilter::new(|req| {
///     req.insert_context("seen", true);
///     None
/// });
/// ```
pub struct FnRequestFilter<F> {
    f: F,
}

impl<F> FnRequestFilter<F>
where
    F: Fn(&mut RequestContext) -> Option<Response> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> RequestFilter for FnRequestFilter<F>
where
    F: Fn(&mut RequestContext) -> Option<Response> + Send + Sync,
{
    fn filter_request(&self, req: &mut RequestContext) -> Option<Response> {
        (self.f)(req)
    }

    fn name(&self) -> &'static str {
        "weir::pipeline::filter::FnRequestFilter"
    }
}

/// Wraps a bare function as a [`ResponseFilter`].
pub struct FnResponseFilter<F> {
    f: F,
}

impl<F> FnResponseFilter<F>
where
    F: Fn(&mut RequestContext, &mut Response) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ResponseFilter for FnResponseFilter<F>
where
    F: Fn(&mut RequestContext, &mut Response) + Send + Sync,
{
    fn filter_response(&self, req: &mut RequestContext, res: &mut Response) {
        (self.f)(req, res)
    }

    fn name(&self) -> &'static str {
        "weir::pipeline::filter::FnResponseFilter"
    }
}
