use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use weir::{
    FnRequestFilter, FnResponseFilter, Method, Pipeline, RequestBuilder, RequestContext, Response,
    StatusCode,
};

fn get_request() -> RequestContext {
    let request = RequestBuilder::new()
        .method(Method::GET)
        .path("/hello")
        .build()
        .unwrap();
    RequestContext::new(request)
}

fn counting_filter(counter: Arc<AtomicUsize>) -> FnRequestFilter<impl Fn(&mut RequestContext) -> Option<Response> + Send + Sync>
{
    FnRequestFilter::new(move |_req| {
        counter.fetch_add(1, Ordering::SeqCst);
        None
    })
}

fn counting_response_filter(
    counter: Arc<AtomicUsize>,
) -> FnResponseFilter<impl Fn(&mut RequestContext, &mut Response) + Send + Sync> {
    FnResponseFilter::new(move |_req, _res| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_pipeline_no_response_yields_404() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut p = Pipeline::new();
    p.add_upstream(counting_filter(counter.clone()));
    p.add_upstream(counting_filter(counter.clone()));
    p.add_upstream(counting_filter(counter.clone()));

    let mut req = get_request();
    let response = p.execute(&mut req);

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(response.status, StatusCode::NotFound);
    assert_eq!(response.content_length(), Some(9));
}

#[test]
fn test_pipeline_short_circuits_on_response() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut p = Pipeline::new();
    p.add_upstream(counting_filter(counter.clone()));
    p.add_upstream(counting_filter(counter.clone()));
    p.add_upstream({
        let counter = counter.clone();
        FnRequestFilter::new(move |_req| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(Response::ok("OK"))
        })
    });
    // Never reached: the previous filter produced the response.
    p.add_upstream(counting_filter(counter.clone()));

    let mut req = get_request();
    let response = p.execute(&mut req);

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(req.stages.len(), 3);
}

#[test]
fn test_pipeline_runs_downstream_filters() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut p = Pipeline::new();
    p.add_upstream(counting_filter(counter.clone()));
    p.add_upstream({
        let counter = counter.clone();
        FnRequestFilter::new(move |_req| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(Response::ok("OK"))
        })
    });
    p.add_upstream(counting_filter(counter.clone()));
    p.add_downstream(counting_response_filter(counter.clone()));
    p.add_downstream(counting_response_filter(counter.clone()));

    let mut req = get_request();
    let response = p.execute(&mut req);
    req.finish();

    assert_eq!(counter.load(Ordering::SeqCst), 4);
    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(req.stages.len(), 4);
    assert_eq!(req.signature(), "FFF7AA40");
}

#[test]
fn test_pipeline_signature_tracks_stage_status() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut p = Pipeline::new();
    p.add_upstream(counting_filter(counter.clone()));
    p.add_upstream({
        let counter = counter.clone();
        FnRequestFilter::new(move |req| {
            counter.fetch_add(1, Ordering::SeqCst);
            req.set_stage_status(1);
            None
        })
    });
    p.add_upstream({
        let counter = counter.clone();
        FnRequestFilter::new(move |_req| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(Response::ok("OK"))
        })
    });
    p.add_downstream(counting_response_filter(counter.clone()));
    p.add_downstream(counting_response_filter(counter.clone()));

    let mut req = get_request();
    let response = p.execute(&mut req);
    req.finish();

    assert_eq!(counter.load(Ordering::SeqCst), 5);
    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(req.stages.len(), 5);
    assert_eq!(req.signature(), "6D2C4578");
}

#[test]
fn test_pipeline_stage_names_follow_filter_order() {
    struct First;
    struct Second;

    impl weir::RequestFilter for First {
        fn filter_request(&self, _req: &mut RequestContext) -> Option<Response> {
            None
        }
    }

    impl weir::ResponseFilter for Second {
        fn filter_response(&self, _req: &mut RequestContext, _res: &mut Response) {}
    }

    let mut p = Pipeline::new();
    p.add_upstream(First);
    p.add_downstream(Second);

    let mut req = get_request();
    p.execute(&mut req);

    assert_eq!(req.stages.len(), 2);
    assert!(req.stages[0].name.ends_with("First"));
    assert!(req.stages[1].name.ends_with("Second"));
}

#[test]
fn test_pipeline_downstream_can_mutate_response() {
    let mut p = Pipeline::new();
    p.add_upstream(FnRequestFilter::new(|_req| Some(Response::ok("OK"))));
    p.add_downstream(FnResponseFilter::new(|_req, res| {
        res.headers
            .insert("X-Filtered".to_string(), "yes".to_string());
    }));

    let mut req = get_request();
    let response = p.execute(&mut req);

    assert_eq!(response.header("X-Filtered").unwrap(), "yes");
}
