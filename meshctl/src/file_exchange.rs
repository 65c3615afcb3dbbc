//! On-demand file transfer over the `/meshctl/file-exchange/1.0.0` protocol.
//!
//! One stream carries one exchange. The initiator writes a single frame
//! holding the UTF-8 file id; the responder answers with a single frame of
//! raw file bytes and closes, or resets the stream when it has nothing to
//! send. An empty response frame is a valid empty file, never "not found".

use std::sync::Arc;

use bytes::Bytes;
use meshctl_net::framing::is_reset;
use meshctl_net::{BoxStream, FramedStream, Network, PeerId, Protocol, StreamHandler};

use crate::error::Error;
use crate::registry::{Registry, SharedFile};

/// What the responder did with one inbound stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    Sent { file_id: String, bytes: usize },
    NotFound { file_id: String },
    Malformed,
    /// The initiator went away before sending a request
    Abandoned,
}

/// Inbound handler serving files out of `registry`
pub fn responder(registry: Arc<Registry>, max_frame_length: usize) -> StreamHandler {
    meshctl_net::stream_handler(move |stream| {
        let registry = registry.clone();
        async move {
            let peer = stream.remote_peer();
            let served = serve(&registry, stream, max_frame_length).await;
            tracing::debug!(%peer, ?served, "file exchange finished");
        }
    })
}

#[tracing::instrument(skip_all, fields(peer = %stream.remote_peer()))]
pub async fn serve(registry: &Registry, stream: BoxStream, max_frame_length: usize) -> Served {
    let mut framed = FramedStream::with_max_frame_length(stream, max_frame_length);
    let request = match framed.recv().await {
        Ok(Some(request)) => request,
        Ok(None) => return Served::Abandoned,
        Err(e) => {
            tracing::debug!(error = %e, "failed to read file request");
            framed.reset();
            return Served::Abandoned;
        }
    };

    let Ok(file_id) = String::from_utf8(request.to_vec()) else {
        tracing::warn!("file request id is not UTF-8");
        framed.reset();
        return Served::Malformed;
    };

    let Some(file) = registry.file(&file_id) else {
        tracing::debug!(file_id, "requested file not shared");
        framed.reset();
        return Served::NotFound { file_id };
    };

    let bytes = file.size();
    if let Err(e) = framed.send(file.content).await {
        tracing::warn!(file_id, error = %e, "failed to send file");
        framed.reset();
        return Served::Abandoned;
    }
    if let Err(e) = framed.close().await {
        tracing::debug!(file_id, error = %e, "failed to close file stream");
    }
    registry.record_sent(0, bytes);
    Served::Sent { file_id, bytes }
}

/// Fetch `file_id` from `peer` and store it as a new [`SharedFile`]
#[tracing::instrument(skip(network, registry))]
pub async fn request_file(
    network: &dyn Network,
    registry: &Registry,
    peer: &PeerId,
    file_id: &str,
    max_frame_length: usize,
) -> Result<SharedFile, Error> {
    let stream = network
        .dial_protocol(peer, Protocol::FileExchange)
        .await
        .map_err(Error::transport("open file-exchange stream", peer))?;
    let mut framed = FramedStream::with_max_frame_length(stream, max_frame_length);

    framed
        .send(Bytes::copy_from_slice(file_id.as_bytes()))
        .await
        .map_err(|e| Error::transport("send file request", peer)(e.into()))?;

    // Only the first response frame is consumed.
    let content = match framed.recv().await {
        Ok(Some(frame)) => frame.freeze(),
        Ok(None) => {
            return Err(Error::NoFileData {
                peer: peer.to_string(),
            });
        }
        Err(e) if is_reset(&e) => {
            return Err(Error::FileNotFound {
                file_id: file_id.to_string(),
                peer: peer.to_string(),
            });
        }
        Err(e) => return Err(Error::transport("read file response", peer)(e.into())),
    };
    drop(framed);

    let file = SharedFile::new(file_id.to_string(), content, *peer);
    registry.record_received(0, file.size());
    registry.add_file(file.clone());
    tracing::info!(size = file.size(), "file received");
    Ok(file)
}
