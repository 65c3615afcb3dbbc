//! Group and direct messaging.
//!
//! Group messages go through the collaborator's pubsub. Direct messages use
//! a dedicated stream protocol carrying one JSON frame per message.

use std::sync::Arc;

use bytes::Bytes;
use meshctl_net::{FramedStream, Network, PeerId, Protocol, StreamHandler};

use crate::error::Error;
use crate::registry::{ChatMessage, Registry};

/// Payload of one direct message on the wire
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessageFrame {
    pub id: uuid::Uuid,
    pub body: String,
    pub sent_at: chrono::DateTime<chrono::Utc>,
}

/// Publish `body` on `topic` and record it in the local topic history
#[tracing::instrument(skip(network, registry, body))]
pub async fn send_group(
    network: &dyn Network,
    registry: &Registry,
    topic: &str,
    body: String,
) -> Result<(ChatMessage, Vec<PeerId>), Error> {
    let payload = Bytes::from(body.clone().into_bytes());
    let size = payload.len();
    let recipients = network
        .publish(topic, payload)
        .await
        .map_err(Error::transport("publish", topic))?;

    let message = ChatMessage::new(body, network.peer_id(), !recipients.is_empty());
    registry.append_topic_message(topic, message.clone());
    registry.record_sent(1, size);
    tracing::debug!(recipients = recipients.len(), "group message sent");
    Ok((message, recipients))
}

/// Deliver one direct message to `peer` and record it in that peer's history
#[tracing::instrument(skip(network, registry, body))]
pub async fn send_direct(
    network: &dyn Network,
    registry: &Registry,
    peer: &PeerId,
    body: String,
    max_frame_length: usize,
) -> Result<ChatMessage, Error> {
    let frame = DirectMessageFrame {
        id: uuid::Uuid::new_v4(),
        body,
        sent_at: chrono::Utc::now(),
    };
    let payload = Bytes::from(serde_json::to_vec(&frame).map_err(|e| {
        Error::MalformedRequest(format!("failed to encode direct message: {e}"))
    })?);
    let size = frame.body.len();

    let stream = network
        .dial_protocol(peer, Protocol::DirectMessage)
        .await
        .map_err(Error::transport("open direct-message stream", peer))?;
    let mut framed = FramedStream::with_max_frame_length(stream, max_frame_length);
    framed
        .send(payload)
        .await
        .map_err(|e| Error::transport("send direct message", peer)(e.into()))?;
    framed
        .close()
        .await
        .map_err(|e| Error::transport("close direct-message stream", peer)(e.into()))?;

    let message = ChatMessage::with_id(frame.id, frame.body, network.peer_id(), true);
    registry.append_peer_message(*peer, message.clone());
    registry.record_sent(1, size);
    Ok(message)
}

/// Inbound handler appending received direct messages to the sender's history
pub fn inbound_handler(registry: Arc<Registry>, max_frame_length: usize) -> StreamHandler {
    meshctl_net::stream_handler(move |stream| {
        let registry = registry.clone();
        async move {
            let peer = stream.remote_peer();
            let mut framed = FramedStream::with_max_frame_length(stream, max_frame_length);
            let frame = match framed.recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::debug!(%peer, "direct-message stream closed without a message");
                    return;
                }
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "failed to read direct message");
                    return;
                }
            };
            match serde_json::from_slice::<DirectMessageFrame>(&frame) {
                Ok(dm) => {
                    let size = dm.body.len();
                    registry.append_peer_message(peer, ChatMessage::with_id(dm.id, dm.body, peer, false));
                    registry.record_received(1, size);
                    tracing::debug!(%peer, "direct message received");
                }
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "dropping undecodable direct message");
                    framed.reset();
                }
            }
        }
    })
}
