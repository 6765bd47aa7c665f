//! Reusable read-buffer pool.
//!
//! Connections are often short-lived while read buffers are large, so the
//! engine recycles buffers across connections instead of allocating per
//! accept. The pool is a leaky bucket over a bounded channel: `take`
//! never blocks (a fresh entry is allocated when the pool is empty) and
//! `give` never blocks (the entry is dropped when the pool is full).

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::mpsc;

/// The swappable byte source a pool entry drains from.
pub type Source = Box<dyn AsyncRead + Send + Unpin>;

/// A pooled read buffer bound to one underlying source at a time.
///
/// The buffer persists across connections; the source is swapped in by
/// [`BufferPool::take`] and detached again by [`BufferPool::give`]. Any
/// bytes still buffered from a previous source are discarded before the
/// swap, so a reused entry only ever yields bytes from its current
/// source.
pub struct PoolEntry {
    buf: BytesMut,
    source: Option<Source>,
}

impl PoolEntry {
    fn new(buffer_size: usize, source: Source) -> Self {
        Self {
            buf: BytesMut::with_capacity(buffer_size),
            source: Some(source),
        }
    }

    /// Number of bytes currently buffered ahead of the source.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// The buffered bytes not yet consumed.
    pub(crate) fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Discards `n` buffered bytes from the front.
    pub(crate) fn consume(&mut self, n: usize) {
        self.buf.advance(n);
    }

    /// Pulls more bytes from the source into the buffer.
    ///
    /// Returns the number of bytes read; 0 means the source is exhausted
    /// or detached.
    pub(crate) async fn fill(&mut self) -> io::Result<usize> {
        match &mut self.source {
            Some(source) => source.read_buf(&mut self.buf).await,
            None => Ok(0),
        }
    }
}

impl AsyncRead for PoolEntry {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        if !me.buf.is_empty() {
            let n = out.remaining().min(me.buf.len());
            out.put_slice(&me.buf[..n]);
            me.buf.advance(n);
            return Poll::Ready(Ok(()));
        }
        match &mut me.source {
            Some(source) => Pin::new(source).poll_read(cx, out),
            None => Poll::Ready(Ok(())),
        }
    }
}

struct PoolInner {
    buffer_size: usize,
    slots_tx: mpsc::Sender<PoolEntry>,
    slots_rx: Mutex<mpsc::Receiver<PoolEntry>>,
}

/// Bounded pool of [`PoolEntry`] values.
///
/// Cloning the handle is cheap; all clones share the same slots. The
/// pool itself cannot fail: both operations degrade to allocation or
/// disposal when the bucket is empty or full.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Creates a pool holding at most `capacity` entries of
    /// `buffer_size` bytes each.
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let (slots_tx, slots_rx) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(PoolInner {
                buffer_size,
                slots_tx,
                slots_rx: Mutex::new(slots_rx),
            }),
        }
    }

    /// Takes an entry set up to read from `source`.
    ///
    /// A pooled entry has its leftover buffered bytes discarded before
    /// the source is swapped in; if none is available a fresh entry is
    /// allocated with the configured buffer size.
    pub fn take(&self, source: Source) -> PoolEntry {
        let reused = match self.inner.slots_rx.lock() {
            Ok(mut rx) => rx.try_recv().ok(),
            Err(_) => None,
        };
        match reused {
            Some(mut entry) => {
                entry.buf.clear();
                entry.source = Some(source);
                entry
            }
            None => PoolEntry::new(self.inner.buffer_size, source),
        }
    }

    /// Returns an entry to the pool, or drops it if the pool is full.
    ///
    /// The source is detached either way so the underlying reader is
    /// released as soon as the connection is done with it.
    pub fn give(&self, mut entry: PoolEntry) {
        entry.source = None;
        let _ = self.inner.slots_tx.try_send(entry);
    }
}
