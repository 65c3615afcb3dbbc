use bytes::Bytes;
use meshctl_net::PeerId;
use serde_json::{Value, json};

use super::CommandSurface;
use crate::error::Error;
use crate::registry::SharedFile;

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ShareArgs {
    content: Option<String>,
    content_base64: Option<String>,
    file_id: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RequestArgs {
    peer_id: PeerId,
    file_id: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AnnounceArgs {
    file_id: String,
    topic: Option<String>,
}

/// Published on the announce topic by `announce_file`
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnnouncement {
    pub file_id: String,
    pub size: usize,
    pub sender_peer_id: PeerId,
}

impl ShareArgs {
    fn into_bytes(self) -> Result<(Option<String>, Bytes), Error> {
        let content = match (self.content, self.content_base64) {
            (Some(text), None) => Bytes::from(text.into_bytes()),
            (None, Some(encoded)) => data_encoding::BASE64
                .decode(encoded.as_bytes())
                .map(Bytes::from)
                .map_err(|e| Error::InvalidArguments(format!("contentBase64: {e}")))?,
            _ => {
                return Err(Error::InvalidArguments(
                    "exactly one of content or contentBase64 is required".to_string(),
                ));
            }
        };
        Ok((self.file_id, content))
    }
}

impl CommandSurface {
    pub(super) fn share_file(&self, args: ShareArgs) -> Result<Value, Error> {
        let node = self.node()?;
        let (file_id, content) = args.into_bytes()?;
        let file_id = match file_id {
            Some(id) if id.is_empty() => {
                return Err(Error::InvalidArguments("fileId must not be empty".to_string()));
            }
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };

        if content.len() > self.config.max_frame_length {
            return Err(Error::InvalidArguments(format!(
                "content is {} bytes, more than the {} byte frame limit",
                content.len(),
                self.config.max_frame_length
            )));
        }

        if node.ensure_file_responder(&self.registry, self.config.max_frame_length) {
            tracing::debug!("file-exchange responder registered");
        }
        let file = SharedFile::new(file_id, content, node.peer_id());
        let size = file.size();
        let file_id = file.file_id.clone();
        self.registry.add_file(file);
        tracing::info!(%file_id, size, "file shared");
        Ok(json!({ "fileId": file_id, "size": size }))
    }

    pub(super) async fn request_file(&self, args: RequestArgs) -> Result<Value, Error> {
        let node = self.node()?;
        let file = crate::file_exchange::request_file(
            node.network().as_ref(),
            &self.registry,
            &args.peer_id,
            &args.file_id,
            self.config.max_frame_length,
        )
        .await?;
        Ok(json!({
            "fileId": file.file_id,
            "size": file.size(),
            "senderPeerId": file.sender,
        }))
    }

    pub(super) fn list_shared_files(&self) -> Result<Value, Error> {
        self.node()?;
        let files = self.registry.files();
        Ok(json!({ "files": files, "count": files.len() }))
    }

    pub(super) async fn announce_file(&self, args: AnnounceArgs) -> Result<Value, Error> {
        let node = self.node()?;
        let file = self.registry.file(&args.file_id).ok_or_else(|| Error::NotFound {
            what: "file",
            id: args.file_id.clone(),
        })?;
        let topic = args
            .topic
            .unwrap_or_else(|| self.config.file_announce_topic.clone());
        let announcement = FileAnnouncement {
            file_id: file.file_id,
            size: file.content.len(),
            sender_peer_id: node.peer_id(),
        };
        let payload = Bytes::from(serde_json::to_vec(&announcement)?);
        let size = payload.len();
        let recipients = node
            .network()
            .publish(&topic, payload)
            .await
            .map_err(Error::transport("publish", &topic))?;
        self.registry.record_sent(1, size);
        Ok(json!({
            "fileId": announcement.file_id,
            "topic": topic,
            "recipients": recipients,
        }))
    }
}
