use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{watch, Notify};

use crate::http::parser::read_request;
use crate::http::writer::{normalize_framing, write_response};
use crate::pipeline::context::{RequestContext, StageStat};
use crate::pipeline::Pipeline;
use crate::pool::BufferPool;

/// Drives one accepted connection: read a request, run the pipeline,
/// write the response, repeat until keep-alive ends or the server is
/// draining.
pub(crate) struct ConnWorker {
    pub(crate) pipeline: Arc<Pipeline>,
    pub(crate) pool: BufferPool,
    pub(crate) stop: watch::Receiver<bool>,
    pub(crate) push: bool,
    pub(crate) read_grace: Duration,
    pub(crate) log_prefix: String,
}

impl ConnWorker {
    pub(crate) async fn run<S>(self, stream: S, peer: Option<SocketAddr>, accepted: Instant)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut entry = self.pool.take(Box::new(read_half));

        let closed = Arc::new(Notify::new());
        let dislodge = Arc::new(Notify::new());
        self.spawn_sentinel(closed.clone(), dislodge.clone());

        let peer_label = peer
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut start_time = accepted;

        loop {
            let request = tokio::select! {
                res = read_request(&mut entry) => match res {
                    Ok(Some(request)) => request,
                    // Remote closed between requests; nothing to report.
                    Ok(None) => break,
                    Err(e) => {
                        crate::error!(
                            "{} {} error reading request: {}",
                            self.log_prefix,
                            peer_label,
                            e
                        );
                        break;
                    }
                },
                // Sentinel-imposed deadline: shutdown draining.
                _ = dislodge.notified() => break,
            };

            let mut keep_alive = request.keep_alive();
            let init_done = Instant::now();

            let mut req = RequestContext::with_start(request, peer, start_time);
            req.append_stage(StageStat::completed("server.Init", start_time, init_done));

            let mut response = self.pipeline.execute(&mut req);

            if *self.stop.borrow() {
                // Shutdown began while the pipeline ran; finish this
                // exchange, then close.
                response.close = true;
            }
            if response.close {
                keep_alive = false;
            }

            req.start_stage("server.ResponseWrite");
            normalize_framing(&mut response);
            let written = if self.push {
                write_response(&mut write_half, &mut response).await
            } else {
                let mut buffered = BufWriter::new(&mut write_half);
                write_response(&mut buffered, &mut response).await
            };
            req.finish_stage();
            req.finish();
            self.dispatch_done(req);

            if let Err(e) = written {
                crate::error!(
                    "{} {} error writing response: {}",
                    self.log_prefix,
                    peer_label,
                    e
                );
                break;
            }
            if !keep_alive {
                break;
            }
            start_time = Instant::now();
        }

        self.pool.give(entry);
        let _ = write_half.shutdown().await;
        closed.notify_one();
    }

    /// Watches for the stop broadcast and converts it into a bounded
    /// read deadline: once shutdown begins, a read blocked on an idle
    /// keep-alive connection is forced off the socket after the grace
    /// period.
    fn spawn_sentinel(&self, closed: Arc<Notify>, dislodge: Arc<Notify>) {
        let mut stop = self.stop.clone();
        let grace = self.read_grace;
        tokio::spawn(async move {
            let stop_requested = async {
                if !*stop.borrow_and_update() {
                    let _ = stop.changed().await;
                }
            };
            tokio::select! {
                _ = stop_requested => {
                    tokio::time::sleep(grace).await;
                    dislodge.notify_one();
                }
                _ = closed.notified() => {}
            }
        });
    }

    fn dispatch_done(&self, req: RequestContext) {
        if let Some(callback) = &self.pipeline.request_done {
            let callback = callback.clone();
            // The connection must not wait on the callback.
            tokio::spawn(async move {
                let mut req = req;
                let _ = callback.filter_request(&mut req);
            });
        }
    }
}
