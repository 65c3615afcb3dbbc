use meshctl_net::PeerId;
use serde_json::{Value, json};

use super::CommandSurface;
use crate::error::Error;

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GroupMessageArgs {
    topic: String,
    message: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DirectMessageArgs {
    peer_id: PeerId,
    message: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TopicArgs {
    topic: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct HistoryArgs {
    topic: Option<String>,
    peer_id: Option<PeerId>,
    limit: Option<usize>,
}

fn non_empty_topic(topic: &str) -> Result<(), Error> {
    if topic.trim().is_empty() {
        return Err(Error::InvalidArguments("topic must not be empty".to_string()));
    }
    Ok(())
}

impl CommandSurface {
    pub(super) async fn send_group_message(&self, args: GroupMessageArgs) -> Result<Value, Error> {
        non_empty_topic(&args.topic)?;
        let node = self.node()?;
        let (message, recipients) = crate::messaging::send_group(
            node.network().as_ref(),
            &self.registry,
            &args.topic,
            args.message,
        )
        .await?;
        Ok(json!({
            "messageId": message.message_id,
            "topic": args.topic,
            "recipients": recipients,
        }))
    }

    pub(super) async fn send_direct_message(&self, args: DirectMessageArgs) -> Result<Value, Error> {
        let node = self.node()?;
        if args.peer_id == node.peer_id() {
            return Err(Error::InvalidArguments(
                "cannot send a direct message to self".to_string(),
            ));
        }
        let message = crate::messaging::send_direct(
            node.network().as_ref(),
            &self.registry,
            &args.peer_id,
            args.message,
            self.config.max_frame_length,
        )
        .await?;
        Ok(json!({
            "messageId": message.message_id,
            "peerId": args.peer_id,
            "delivered": message.delivered,
        }))
    }

    pub(super) async fn subscribe_topic(&self, args: TopicArgs) -> Result<Value, Error> {
        non_empty_topic(&args.topic)?;
        let node = self.node()?;
        node.network()
            .subscribe(&args.topic)
            .await
            .map_err(Error::transport("subscribe", &args.topic))?;
        self.registry.subscribe(&args.topic);
        Ok(json!({ "topic": args.topic, "subscribed": true }))
    }

    pub(super) async fn unsubscribe_topic(&self, args: TopicArgs) -> Result<Value, Error> {
        let node = self.node()?;
        node.network()
            .unsubscribe(&args.topic)
            .await
            .map_err(Error::transport("unsubscribe", &args.topic))?;
        self.registry.unsubscribe(&args.topic);
        Ok(json!({ "topic": args.topic, "subscribed": false }))
    }

    pub(super) fn message_history(&self, args: HistoryArgs) -> Result<Value, Error> {
        self.node()?;
        let limit = args.limit.unwrap_or(self.config.history_limit);
        let messages = match (args.topic, args.peer_id) {
            (Some(topic), None) => self.registry.topic_history(&topic, limit),
            (None, Some(peer)) => self.registry.peer_history(&peer, limit),
            _ => {
                return Err(Error::InvalidArguments(
                    "exactly one of topic or peerId is required".to_string(),
                ));
            }
        };
        Ok(json!({ "messages": messages, "count": messages.len() }))
    }

    pub(super) fn topic_subscribers(&self, args: TopicArgs) -> Result<Value, Error> {
        let node = self.node()?;
        let subscribers = node.network().subscribers(&args.topic);
        Ok(json!({
            "topic": args.topic,
            "subscribers": subscribers,
            "count": subscribers.len(),
        }))
    }
}
