use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use crate::network::{BiStream, PeerId};
use crate::protocol::Protocol;

const DUPLEX_BUF_SIZE: usize = 64 * 1024;

/// In-memory stream backed by one end of a `tokio::io::duplex` pair.
///
/// A reset is signalled through a flag shared with the other end: the
/// resetting side raises it before dropping its half, so the reader sees
/// `ConnectionReset` where it would otherwise have seen EOF.
pub struct MemoryStream {
    io: DuplexStream,
    remote: PeerId,
    protocol: Protocol,
    reset_by_us: Arc<AtomicBool>,
    reset_by_peer: Arc<AtomicBool>,
}

impl MemoryStream {
    /// Connected pair: the first is held by `a` (remote = `b`), the second by `b`
    pub fn pair(a: PeerId, b: PeerId, protocol: Protocol) -> (MemoryStream, MemoryStream) {
        let (a_io, b_io) = tokio::io::duplex(DUPLEX_BUF_SIZE);
        let a_reset = Arc::new(AtomicBool::new(false));
        let b_reset = Arc::new(AtomicBool::new(false));
        (
            MemoryStream {
                io: a_io,
                remote: b,
                protocol: protocol.clone(),
                reset_by_us: a_reset.clone(),
                reset_by_peer: b_reset.clone(),
            },
            MemoryStream {
                io: b_io,
                remote: a,
                protocol,
                reset_by_us: b_reset,
                reset_by_peer: a_reset,
            },
        )
    }
}

impl AsyncRead for MemoryStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        std::task::ready!(Pin::new(&mut self.io).poll_read(cx, buf))?;
        let eof = buf.filled().len() == before && buf.remaining() > 0;
        if eof && self.reset_by_peer.load(Ordering::SeqCst) {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "stream reset by peer",
            )));
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MemoryStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

impl BiStream for MemoryStream {
    fn remote_peer(&self) -> PeerId {
        self.remote
    }

    fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    fn reset(self: Box<Self>) {
        self.reset_by_us.store(true, Ordering::SeqCst);
        drop(self);
    }
}
