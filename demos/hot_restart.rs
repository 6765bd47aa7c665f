//! Hot restart wiring.
//!
//! Run it, then send SIGHUP to replace the process: it fork/execs itself
//! with `--socket <fd>` so the child inherits the listening socket. The
//! child sends SIGUSR1 back once its accept loop is ready; the old
//! process then stops accepting, drains its connections, and exits.
//! SIGINT and SIGTERM drain and exit; SIGTSTP suspends.

#[cfg(unix)]
use std::os::fd::RawFd;
#[cfg(unix)]
use std::process::Command;
#[cfg(unix)]
use std::sync::Arc;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
#[cfg(unix)]
use weir::{FnRequestFilter, Pipeline, Response, Server};

#[cfg(unix)]
fn parse_socket_fd() -> Option<RawFd> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == "--socket" {
            return args.next()?.parse().ok();
        }
    }
    None
}

#[cfg(unix)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let pid = std::process::id();

    let mut pipeline = Pipeline::new();
    pipeline.add_upstream(FnRequestFilter::new(|_req| Some(Response::ok("OK\n"))));

    let server = Arc::new(Server::new(8090, pipeline));

    // A restart child adopts the inherited socket instead of binding,
    // then tells its parent to stand down once it is accepting.
    if let Some(fd) = parse_socket_fd() {
        tracing::info!(pid, fd, "adopting inherited listening socket");
        server.fd_listen(fd)?;
        let server = server.clone();
        tokio::spawn(async move {
            server.accept_ready().await;
            let ppid = unsafe { libc::getppid() };
            tracing::info!(pid, ppid, "accepting; telling parent to stand down");
            unsafe { libc::kill(ppid, libc::SIGUSR1) };
        });
    }

    {
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_signals(server).await {
                tracing::error!("signal handling failed: {}", e);
            }
        });
    }

    server.listen_and_serve().await?;
    tracing::info!(pid, "drained, exiting");
    Ok(())
}

#[cfg(unix)]
async fn handle_signals(server: Arc<Server>) -> anyhow::Result<()> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut child_ready = signal(SignalKind::user_defined1())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut suspend = signal(SignalKind::from_raw(libc::SIGTSTP))?;

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                let Some(fd) = server.socket_fd() else {
                    tracing::error!("SIGHUP before the socket is bound; ignoring");
                    continue;
                };
                let exe = std::env::current_exe()?;
                match Command::new(exe).arg("--socket").arg(fd.to_string()).spawn() {
                    Ok(child) => tracing::info!(child = child.id(), "forked replacement"),
                    Err(e) => tracing::error!("failed to spawn replacement: {}", e),
                }
            }
            _ = child_ready.recv() => {
                tracing::info!("replacement is accepting; stopping");
                server.stop_accepting();
            }
            _ = interrupt.recv() => {
                tracing::info!("SIGINT; draining");
                server.stop_accepting();
            }
            _ = terminate.recv() => {
                tracing::info!("SIGTERM; draining");
                server.stop_accepting();
            }
            _ = suspend.recv() => {
                unsafe { libc::kill(std::process::id() as i32, libc::SIGSTOP) };
            }
        }
    }
}

#[cfg(not(unix))]
fn main() {
    eprintln!("hot restart requires fd inheritance; unix only");
}
