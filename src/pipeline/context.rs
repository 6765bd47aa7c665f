use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::http::request::Request;

/// Timing and status record for one executed pipeline stage.
///
/// The name of a filter stage is the filter's identity (its type path by
/// default). The engine assigns no meaning to `status` beyond the default
/// of 0; conventional values seen in filters are 1 for skip, 2 for fail,
/// and 3 upwards for custom codes.
#[derive(Debug, Clone)]
pub struct StageStat {
    pub name: String,
    pub status: u8,
    pub start: Instant,
    pub end: Option<Instant>,
}

impl StageStat {
    /// Starts a stage now with status 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: 0,
            start: Instant::now(),
            end: None,
        }
    }

    /// Builds an already-timed stage with status 0.
    pub fn completed(name: impl Into<String>, start: Instant, end: Instant) -> Self {
        Self {
            name: name.into(),
            status: 0,
            start,
            end: Some(end),
        }
    }

    /// Elapsed time of the stage; zero while it is still open.
    pub fn duration(&self) -> Duration {
        match self.end {
            Some(end) => end.duration_since(self.start),
            None => Duration::ZERO,
        }
    }
}

/// Per-request record carried through the pipeline.
///
/// The record wraps the parsed request together with everything the
/// engine learns along the way: identity, timing, the stats of every
/// completed stage, and the running signature hash.
///
/// The id is a short hex tag meant for correlating log lines, derived
/// from the low decimal digits of the start time plus a small random
/// nonce. It is not unique; duplicates are unlikely over a day or so but
/// permitted. Log it in custom filter output so individual requests can
/// be grepped out of busy logs.
///
/// Stage stats are complete only once the record is finished; `overhead`
/// is the difference between total request time and the sum of stage
/// times, and covers pipeline iteration and stat collection itself.
pub struct RequestContext {
    pub id: String,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
    pub request: Request,
    pub remote_addr: Option<SocketAddr>,
    /// Completed and in-flight stages, in execution order. Append-only;
    /// the current stage is the last entry.
    pub stages: Vec<StageStat>,
    pub overhead: Duration,
    /// Free-form per-request storage for filters.
    pub context: HashMap<String, Box<dyn Any + Send + Sync>>,
    hash: crc32fast::Hasher,
    pipeline_total: Duration,
}

impl RequestContext {
    /// Creates a record for a request with no live connection (tests,
    /// offline pipeline runs).
    pub fn new(request: Request) -> Self {
        Self::with_start(request, None, Instant::now())
    }

    pub(crate) fn with_start(
        request: Request,
        remote_addr: Option<SocketAddr>,
        start_time: Instant,
    ) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let low = (nanos % 1_000_000_000_000) as u64;
        let id = format!("{:010x}", low + rand::thread_rng().gen_range(0..999));

        Self {
            id,
            start_time,
            end_time: None,
            request,
            remote_addr,
            stages: Vec::new(),
            overhead: Duration::ZERO,
            context: HashMap::new(),
            hash: crc32fast::Hasher::new(),
            pipeline_total: Duration::ZERO,
        }
    }

    /// Opens a new stage and makes it current.
    pub fn start_stage(&mut self, name: impl Into<String>) {
        self.stages.push(StageStat::new(name));
    }

    /// Closes the current stage and folds it into the signature and the
    /// pipeline total.
    pub fn finish_stage(&mut self) {
        if let Some(stage) = self.stages.last_mut() {
            stage.end = Some(Instant::now());
        }
        self.finish_common();
    }

    /// Appends a stage that was timed externally, with the same
    /// bookkeeping as a normally-finished stage.
    pub(crate) fn append_stage(&mut self, stage: StageStat) {
        self.stages.push(stage);
        self.finish_common();
    }

    /// Sets the status byte of the current stage. Filters call this to
    /// mark skips, failures, or custom outcomes; the value feeds the
    /// request signature.
    pub fn set_stage_status(&mut self, status: u8) {
        if let Some(stage) = self.stages.last_mut() {
            stage.status = status;
        }
    }

    fn finish_common(&mut self) {
        if let Some(stage) = self.stages.last() {
            self.hash.update(stage.name.as_bytes());
            self.hash.update(&[stage.status]);
            self.pipeline_total += stage.duration();
        }
    }

    /// Finalizes the record: stamps the end time and computes overhead.
    pub fn finish(&mut self) {
        let end = Instant::now();
        self.end_time = Some(end);
        self.overhead = end
            .duration_since(self.start_time)
            .saturating_sub(self.pipeline_total);
    }

    /// The signature of the path this request took through the pipeline.
    ///
    /// At any point it is the CRC-32 (IEEE) of the concatenated
    /// name-and-status bytes of every completed stage, in completion
    /// order, rendered as uppercase hex. Identical traversals produce
    /// identical signatures, so flows can be classified after the fact;
    /// change a stage status or the filter order and the signature
    /// changes with it.
    pub fn signature(&self) -> String {
        format!("{:X}", self.hash.clone().finalize())
    }

    /// Sum of all completed stage durations.
    pub fn pipeline_total(&self) -> Duration {
        self.pipeline_total
    }

    /// Stores a typed value in the per-request context map.
    pub fn insert_context<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.context.insert(key.into(), Box::new(value));
    }

    /// Fetches a typed value from the per-request context map.
    pub fn get_context<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.context.get(key)?.downcast_ref()
    }

    /// Logs a per-stage breakdown of the request through the logging
    /// facade. Call it from a done callback; it is too expensive for the
    /// request path proper.
    pub fn trace(&self) {
        let total = match self.end_time {
            Some(end) => end.duration_since(self.start_time).as_secs_f32(),
            None => 0.0,
        };
        crate::trace!(
            "{} [{}] {} Sig={} Tot={:.4}",
            self.id,
            self.request.method.as_str(),
            self.request.path,
            self.signature(),
            total
        );
        for stage in &self.stages {
            let dur = stage.duration().as_secs_f32();
            let share = if total > 0.0 { dur / total * 100.0 } else { 0.0 };
            crate::trace!(
                "{} {:<30} S={} Tot={:.4} %={:.2}",
                self.id,
                stage.name,
                stage.status,
                dur,
                share
            );
        }
        let overhead = self.overhead.as_secs_f32();
        let share = if total > 0.0 {
            overhead / total * 100.0
        } else {
            0.0
        };
        crate::trace!(
            "{} {:<30} S=0 Tot={:.4} %={:.2}",
            self.id,
            "Overhead",
            overhead,
            share
        );
    }
}
