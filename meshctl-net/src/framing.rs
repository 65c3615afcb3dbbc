//! Length-prefixed framing over a [`BiStream`].
//!
//! Wire format: a 4-byte unsigned big-endian length followed by exactly that
//! many payload bytes. Several frames may follow each other on one stream.

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::network::{BoxStream, PeerId};

/// Default upper bound for a single frame
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

pub fn codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(max_frame_length)
        .new_codec()
}

/// Framed wrapper for sending and receiving frames on a peer stream
pub struct FramedStream {
    remote: PeerId,
    inner: Framed<BoxStream, LengthDelimitedCodec>,
}

impl FramedStream {
    pub fn new(stream: BoxStream) -> Self {
        Self::with_max_frame_length(stream, DEFAULT_MAX_FRAME_LENGTH)
    }

    pub fn with_max_frame_length(stream: BoxStream, max_frame_length: usize) -> Self {
        Self {
            remote: stream.remote_peer(),
            inner: Framed::new(stream, codec(max_frame_length)),
        }
    }

    pub fn remote_peer(&self) -> PeerId {
        self.remote
    }

    /// Write one frame and flush it
    pub async fn send(&mut self, payload: Bytes) -> std::io::Result<()> {
        self.inner.send(payload).await
    }

    /// Read the next frame; `Ok(None)` on clean end of stream
    pub async fn recv(&mut self) -> std::io::Result<Option<BytesMut>> {
        self.inner.next().await.transpose()
    }

    /// Flush and close our sending side; the peer reads EOF after our frames
    pub async fn close(mut self) -> std::io::Result<()> {
        SinkExt::<Bytes>::close(&mut self.inner).await
    }

    /// Abort the stream without a goodbye
    pub fn reset(self) {
        self.inner.into_inner().reset();
    }
}

/// Whether an I/O error means the remote aborted the stream
pub fn is_reset(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStream;
    use crate::protocol::Protocol;
    use tokio::io::AsyncReadExt;

    fn pair() -> (FramedStream, FramedStream) {
        let a = meshctl_id52::SecretKey::generate().public_key();
        let b = meshctl_id52::SecretKey::generate().public_key();
        let (left, right) = MemoryStream::pair(a, b, Protocol::FileExchange);
        (
            FramedStream::new(Box::new(left)),
            FramedStream::new(Box::new(right)),
        )
    }

    #[tokio::test]
    async fn frames_keep_their_boundaries() {
        let (mut left, mut right) = pair();
        left.send(Bytes::from_static(b"first")).await.unwrap();
        left.send(Bytes::new()).await.unwrap();
        left.send(Bytes::from_static(b"third")).await.unwrap();
        left.close().await.unwrap();

        assert_eq!(&right.recv().await.unwrap().unwrap()[..], b"first");
        assert_eq!(right.recv().await.unwrap().unwrap().len(), 0);
        assert_eq!(&right.recv().await.unwrap().unwrap()[..], b"third");
        assert!(right.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn length_prefix_is_u32_big_endian() {
        let a = meshctl_id52::SecretKey::generate().public_key();
        let b = meshctl_id52::SecretKey::generate().public_key();
        let (left, mut right) = MemoryStream::pair(a, b, Protocol::FileExchange);
        let mut left = FramedStream::new(Box::new(left));
        left.send(Bytes::from_static(b"abc")).await.unwrap();
        left.close().await.unwrap();

        let mut raw = Vec::new();
        right.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw, [0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn reset_is_distinguishable_from_close() {
        let (left, mut right) = pair();
        left.reset();
        let err = right.recv().await.unwrap_err();
        assert!(is_reset(&err));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let a = meshctl_id52::SecretKey::generate().public_key();
        let b = meshctl_id52::SecretKey::generate().public_key();
        let (left, right) = MemoryStream::pair(a, b, Protocol::FileExchange);
        let mut left = FramedStream::new(Box::new(left));
        let mut right = FramedStream::with_max_frame_length(Box::new(right), 4);
        left.send(Bytes::from_static(b"too long")).await.unwrap();
        assert!(right.recv().await.is_err());
    }
}
