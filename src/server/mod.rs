//! Connection engine.
//!
//! One [`Server`] owns one listening socket and drives every connection
//! accepted from it. The accept loop spawns a worker task per
//! connection; each worker reads requests serially, runs the pipeline,
//! and writes responses until keep-alive ends or the server begins
//! draining.
//!
//! # Lifecycle
//!
//! ```text
//!   bind (or adopt inherited fd)
//!        │
//!        ▼
//!   accept loop ──spawn──▶ worker per connection
//!        │                      │
//!   stop_accepting()            │ sentinel converts the stop signal
//!        │                      │ into a bounded read deadline
//!        ▼                      ▼
//!   drain: wait for workers, then return from listen_and_serve
//! ```
//!
//! Hot restart is built from the exposed primitives: `socket_fd` hands
//! the duplicated listener fd to an exec'd child, the child adopts it
//! with `fd_listen`, waits for `accept_ready`, and signals the parent,
//! which calls `stop_accepting` and exits once drained.

mod conn;

use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::path::Path;
use std::process;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Instant;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;

use crate::config::EngineConfig;
use crate::pipeline::Pipeline;
use crate::pool::BufferPool;
use crate::server::conn::ConnWorker;

#[cfg(unix)]
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

#[cfg(target_os = "linux")]
const PUSH_SOCK_OPT: Option<libc::c_int> = Some(libc::TCP_CORK);
#[cfg(any(target_os = "freebsd", target_os = "macos"))]
const PUSH_SOCK_OPT: Option<libc::c_int> = Some(libc::TCP_NOPUSH);
#[cfg(all(
    unix,
    not(any(target_os = "linux", target_os = "freebsd", target_os = "macos"))
))]
const PUSH_SOCK_OPT: Option<libc::c_int> = None;

/// Startup and lifecycle errors surfaced to the caller.
///
/// Runtime errors never appear here; they are logged and confined to the
/// connection they occurred on.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("server has no bound listener")]
    NotBound,
    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),
    #[error("inherited fd {0} is not a listening TCP socket")]
    NotTcpListener(i32),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// HTTP/1.1 server bound to one listening socket.
///
/// All lifecycle methods take `&self`, so a server is typically wrapped
/// in an `Arc` and driven from several tasks: one awaiting
/// [`Server::listen_and_serve`], others calling [`Server::stop_accepting`]
/// or reading [`Server::port`].
pub struct Server {
    addr: String,
    pipeline: Arc<Pipeline>,
    config: EngineConfig,
    listener: Mutex<Option<StdTcpListener>>,
    local_addr: OnceLock<SocketAddr>,
    #[cfg(unix)]
    listener_fd: OnceLock<RawFd>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    ready_tx: mpsc::Sender<()>,
    ready_rx: AsyncMutex<mpsc::Receiver<()>>,
    push: bool,
    log_prefix: String,
    pool: BufferPool,
}

impl Server {
    /// Creates a server listening on all interfaces at `port` with
    /// default engine tunables.
    pub fn new(port: u16, pipeline: Pipeline) -> Self {
        let config = EngineConfig {
            listen_addr: format!("0.0.0.0:{}", port),
            ..EngineConfig::default()
        };
        Self::from_config(config, pipeline)
    }

    /// Creates a server from explicit engine tunables.
    pub fn from_config(config: EngineConfig, pipeline: Pipeline) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = mpsc::channel(1);
        let pool = BufferPool::new(config.pool_capacity, config.buffer_size);

        Self {
            addr: config.listen_addr.clone(),
            pipeline: Arc::new(pipeline),
            config,
            listener: Mutex::new(None),
            local_addr: OnceLock::new(),
            #[cfg(unix)]
            listener_fd: OnceLock::new(),
            stop_tx,
            stop_rx,
            ready_tx,
            ready_rx: AsyncMutex::new(ready_rx),
            push: push_supported(),
            log_prefix: process::id().to_string(),
            pool,
        }
    }

    /// Binds the configured address if nothing is bound yet, then runs
    /// the accept loop.
    ///
    /// Returns once the accept loop has exited and every connection
    /// worker has drained.
    pub async fn listen_and_serve(&self) -> Result<(), ServerError> {
        self.ensure_bound()?;
        self.serve(None).await
    }

    /// Like [`Server::listen_and_serve`], with TLS termination.
    ///
    /// The raw TCP listener is bound first, so fd inheritance and hot
    /// restart work the same as for plaintext servers; TLS is negotiated
    /// per accepted connection with `http/1.1` as the ALPN protocol.
    pub async fn listen_and_serve_tls(
        &self,
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<(), ServerError> {
        let tls = load_tls_acceptor(cert_path.as_ref(), key_path.as_ref())?;
        self.ensure_bound()?;
        self.serve(Some(tls)).await
    }

    /// Adopts an already-listening TCP socket inherited from a parent
    /// process.
    ///
    /// The fd is validated to be a listening stream socket before it is
    /// taken over.
    #[cfg(unix)]
    pub fn fd_listen(&self, fd: RawFd) -> Result<(), ServerError> {
        validate_listening_fd(fd)?;
        let listener = unsafe { StdTcpListener::from_raw_fd(fd) };
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;
        let _ = self.local_addr.set(local);
        self.setup_inheritable_fd(&listener)?;
        *self.listener_slot() = Some(listener);
        Ok(())
    }

    /// The inheritable duplicate of the listening socket's fd, for
    /// passing to a restart child. `None` until the server is bound.
    #[cfg(unix)]
    pub fn socket_fd(&self) -> Option<RawFd> {
        self.listener_fd.get().copied()
    }

    /// The bound port, or 0 if the server is not bound yet.
    pub fn port(&self) -> u16 {
        self.local_addr.get().map(|a| a.port()).unwrap_or(0)
    }

    /// Stops accepting new connections.
    ///
    /// The signal is a broadcast observed by the accept loop and by
    /// every connection sentinel; it is idempotent and never rescinded
    /// within a process lifetime. In-flight requests run to completion
    /// and idle keep-alive reads are dislodged after the configured
    /// grace period.
    pub fn stop_accepting(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Waits until the accept loop is ready to accept connections.
    ///
    /// The underlying signal has capacity 1: a restart child uses a
    /// single wait to know when to tell its parent to stand down.
    pub async fn accept_ready(&self) {
        let mut rx = self.ready_rx.lock().await;
        let _ = rx.recv().await;
    }

    fn listener_slot(&self) -> MutexGuard<'_, Option<StdTcpListener>> {
        match self.listener.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn ensure_bound(&self) -> Result<(), ServerError> {
        if self.listener_slot().is_none() {
            self.socket_listen()?;
        }
        Ok(())
    }

    fn socket_listen(&self) -> Result<(), ServerError> {
        let listener = StdTcpListener::bind(&self.addr).map_err(|source| ServerError::Bind {
            addr: self.addr.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;
        let _ = self.local_addr.set(local);
        #[cfg(unix)]
        self.setup_inheritable_fd(&listener)?;
        *self.listener_slot() = Some(listener);
        Ok(())
    }

    /// Duplicates the listener fd so it survives exec, and enables the
    /// platform's push/cork socket option when there is one. The socket
    /// option is a throughput tweak only; failures are ignored.
    #[cfg(unix)]
    fn setup_inheritable_fd(&self, listener: &StdTcpListener) -> Result<(), ServerError> {
        // dup() clears close-on-exec, which is what lets a restart child
        // inherit the socket
        let fd = unsafe { libc::dup(listener.as_raw_fd()) };
        if fd < 0 {
            return Err(ServerError::Io(io::Error::last_os_error()));
        }
        if let Some(opt) = PUSH_SOCK_OPT {
            let one: libc::c_int = 1;
            unsafe {
                libc::setsockopt(
                    fd,
                    libc::IPPROTO_TCP,
                    opt,
                    &one as *const libc::c_int as *const libc::c_void,
                    std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                );
            }
        }
        let _ = self.listener_fd.set(fd);
        Ok(())
    }

    async fn serve(&self, tls: Option<TlsAcceptor>) -> Result<(), ServerError> {
        let std_listener = self.listener_slot().take().ok_or(ServerError::NotBound)?;
        let listener = TcpListener::from_std(std_listener)?;

        let _ = self.ready_tx.try_send(());

        let mut stop_rx = self.stop_rx.clone();
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

        loop {
            // A bounded accept keeps the loop responsive to the stop
            // signal even when no connections arrive.
            match tokio::time::timeout(self.config.accept_deadline, listener.accept()).await {
                Err(_) => {}
                Ok(Err(e)) if is_transient_accept_error(&e) => {}
                Ok(Err(e)) => {
                    crate::error!("{} accept error: {}", self.log_prefix, e);
                }
                Ok(Ok((stream, peer))) => {
                    let worker = ConnWorker {
                        pipeline: self.pipeline.clone(),
                        pool: self.pool.clone(),
                        stop: self.stop_rx.clone(),
                        push: self.push,
                        read_grace: self.config.read_grace,
                        log_prefix: self.log_prefix.clone(),
                    };
                    let tls = tls.clone();
                    let done = done_tx.clone();
                    let accepted = Instant::now();
                    tokio::spawn(async move {
                        let _done = done;
                        match tls {
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(stream) => worker.run(stream, Some(peer), accepted).await,
                                Err(e) => {
                                    crate::error!(
                                        "{} TLS handshake with {} failed: {}",
                                        worker.log_prefix,
                                        peer,
                                        e
                                    );
                                }
                            },
                            None => worker.run(stream, Some(peer), accepted).await,
                        }
                    });
                }
            }

            if *stop_rx.borrow_and_update() {
                break;
            }
        }

        crate::trace!("{} stopped accepting, draining workers", self.log_prefix);
        drop(done_tx);
        let _ = done_rx.recv().await;
        Ok(())
    }
}

#[cfg(unix)]
fn push_supported() -> bool {
    PUSH_SOCK_OPT.is_some()
}

#[cfg(not(unix))]
fn push_supported() -> bool {
    false
}

/// Accept failures that are expected under load or during polling and
/// not worth a log line.
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

#[cfg(unix)]
fn validate_listening_fd(fd: RawFd) -> Result<(), ServerError> {
    let mut sock_type: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_TYPE,
            &mut sock_type as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 || sock_type != libc::SOCK_STREAM {
        return Err(ServerError::NotTcpListener(fd));
    }

    let mut accepting: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ACCEPTCONN,
            &mut accepting as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 || accepting == 0 {
        return Err(ServerError::NotTcpListener(fd));
    }

    Ok(())
}

fn load_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, ServerError> {
    let mut cert_reader = io::BufReader::new(std::fs::File::open(cert_path)?);
    let cert_chain = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;

    let mut key_reader = io::BufReader::new(std::fs::File::open(key_path)?);
    let key = rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| ServerError::Tls(rustls::Error::General("no private key found".into())))?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}
