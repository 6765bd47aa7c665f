use std::fmt;
use std::sync::{Arc, Mutex};

use weir::logger::{set_logger, LogError, Logger};

// The backend slot is process-global; serialize the tests that swap it.
static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Captures every record so the facade's routing can be observed.
struct CapturingLogger {
    records: Arc<Mutex<Vec<(&'static str, String)>>>,
    fail_on_error: bool,
}

impl CapturingLogger {
    fn log(&self, level: &'static str, args: fmt::Arguments<'_>) {
        self.records.lock().unwrap().push((level, args.to_string()));
    }
}

impl Logger for CapturingLogger {
    fn finest(&self, args: fmt::Arguments<'_>) {
        self.log("finest", args);
    }

    fn fine(&self, args: fmt::Arguments<'_>) {
        self.log("fine", args);
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        self.log("debug", args);
    }

    fn trace(&self, args: fmt::Arguments<'_>) {
        self.log("trace", args);
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        self.log("info", args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) -> Result<(), LogError> {
        self.log("warn", args);
        Ok(())
    }

    fn error(&self, args: fmt::Arguments<'_>) -> Result<(), LogError> {
        self.log("error", args);
        if self.fail_on_error {
            Err(LogError("sink unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn critical(&self, args: fmt::Arguments<'_>) -> Result<(), LogError> {
        self.log("critical", args);
        Ok(())
    }
}

#[test]
fn test_facade_routes_to_installed_backend() {
    let _lock = TEST_LOCK.lock().unwrap();
    let records = Arc::new(Mutex::new(Vec::new()));
    set_logger(Arc::new(CapturingLogger {
        records: records.clone(),
        fail_on_error: false,
    }));

    weir::finest!("f{}", 1);
    weir::debug!("d{}", 2);
    weir::info!("i{}", 3);
    weir::warn!("w{}", 4);
    weir::critical!("c{}", 5);

    let records = records.lock().unwrap();
    assert_eq!(
        *records,
        vec![
            ("finest", "f1".to_string()),
            ("debug", "d2".to_string()),
            ("info", "i3".to_string()),
            ("warn", "w4".to_string()),
            ("critical", "c5".to_string()),
        ]
    );
}

#[test]
fn test_request_trace_logs_stage_breakdown() {
    let _lock = TEST_LOCK.lock().unwrap();
    let records = Arc::new(Mutex::new(Vec::new()));
    set_logger(Arc::new(CapturingLogger {
        records: records.clone(),
        fail_on_error: false,
    }));

    let filter = weir::FnRequestFilter::new(|_req| Some(weir::Response::ok("OK")));
    let request = weir::RequestBuilder::new()
        .method(weir::Method::GET)
        .path("/hello")
        .build()
        .unwrap();
    let (req, _res) = weir::test_with_filter(request, &filter);

    req.trace();

    let records = records.lock().unwrap();
    // One summary line, one line per stage, one overhead line.
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|(level, _)| *level == "trace"));

    let (_, summary) = &records[0];
    assert!(summary.starts_with(&req.id));
    assert!(summary.contains("/hello"));
    assert!(summary.contains(&format!("Sig={}", req.signature())));

    let (_, stage_line) = &records[1];
    assert!(stage_line.contains("weir::pipeline::filter::FnRequestFilter"));

    let (_, overhead_line) = &records[2];
    assert!(overhead_line.contains("Overhead"));
}

#[test]
fn test_backend_error_is_surfaced() {
    let _lock = TEST_LOCK.lock().unwrap();
    let records = Arc::new(Mutex::new(Vec::new()));
    set_logger(Arc::new(CapturingLogger {
        records: records.clone(),
        fail_on_error: true,
    }));

    let result = weir::logger::error(format_args!("boom"));
    assert!(result.is_err());
    assert_eq!(records.lock().unwrap().len(), 1);
}
