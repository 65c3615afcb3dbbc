//! Two command surfaces talking over one in-process network.

use std::sync::Arc;
use std::time::Duration;

use meshctl::{CommandSurface, Config, ErrorKind};
use meshctl_net::memory::MemoryNetwork;
use meshctl_net::{FramedStream, Network, Protocol, stream_handler};
use serde_json::{Value, json};

fn surface(network: &MemoryNetwork) -> CommandSurface {
    CommandSurface::new(Config::default(), Arc::new(network.factory()), None)
}

async fn running(network: &MemoryNetwork) -> (CommandSurface, String) {
    let surface = surface(network);
    let info = surface
        .call("create_libp2p_node", json!({}))
        .await
        .unwrap();
    let peer = info["peerId"].as_str().unwrap().to_string();
    (surface, peer)
}

/// Both nodes up and connected, with discovery dials settled
async fn connected_pair() -> (MemoryNetwork, (CommandSurface, String), (CommandSurface, String)) {
    let network = MemoryNetwork::new();
    let a = running(&network).await;
    let b = running(&network).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    a.0.call("connect_peer", json!({ "address": b.1 }))
        .await
        .unwrap();
    (network, a, b)
}

async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn connection_ids(surface: &CommandSurface) -> (Vec<String>, Vec<String>) {
    let mut registry: Vec<String> = surface
        .registry()
        .connections()
        .into_iter()
        .map(|c| c.id)
        .collect();
    let mut live: Vec<String> = surface
        .lifecycle()
        .current()
        .map(|node| node.network().connections(None))
        .unwrap_or_default()
        .into_iter()
        .map(|c| c.id)
        .collect();
    registry.sort();
    live.sort();
    (registry, live)
}

fn bodies(history: &Value) -> Vec<String> {
    history["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["body"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn registry_follows_open_and_close() {
    let (_network, (a, _), (b, b_peer)) = connected_pair().await;

    eventually("a's registry to match", || {
        let (registry, live) = connection_ids(&a);
        !live.is_empty() && registry == live
    })
    .await;
    eventually("b's registry to match", || {
        let (registry, live) = connection_ids(&b);
        !live.is_empty() && registry == live
    })
    .await;

    a.call("disconnect_peer", json!({ "peerId": b_peer }))
        .await
        .unwrap();
    let listed = a.call("list_connections", Value::Null).await.unwrap();
    assert_eq!(listed["count"], 0);
    eventually("b to see the close", || {
        let (registry, live) = connection_ids(&b);
        live.is_empty() && registry.is_empty()
    })
    .await;
}

#[tokio::test]
async fn topic_history_keeps_arrival_order_and_limit() {
    let (_network, (a, _), (b, _)) = connected_pair().await;
    b.call("subscribe_topic", json!({ "topic": "t" }))
        .await
        .unwrap();

    for i in 0..5 {
        let sent = a
            .call("send_group_message", json!({ "topic": "t", "message": format!("m{i}") }))
            .await
            .unwrap();
        assert_eq!(sent["recipients"].as_array().unwrap().len(), 1);
    }

    eventually("all five messages at b", || b.registry().topic_history("t", 50).len() == 5).await;

    let all = b
        .call("get_message_history", json!({ "topic": "t" }))
        .await
        .unwrap();
    assert_eq!(bodies(&all), ["m0", "m1", "m2", "m3", "m4"]);

    let last = b
        .call("get_message_history", json!({ "topic": "t", "limit": 2 }))
        .await
        .unwrap();
    assert_eq!(last["count"], 2);
    assert_eq!(bodies(&last), ["m3", "m4"]);

    let sender_side = a
        .call("get_message_history", json!({ "topic": "t", "limit": 10 }))
        .await
        .unwrap();
    assert_eq!(sender_side["count"], 5);
}

#[tokio::test]
async fn direct_messages_land_in_both_peer_histories() {
    let (_network, (a, a_peer), (b, b_peer)) = connected_pair().await;

    let sent = a
        .call("send_direct_message", json!({ "peerId": b_peer, "message": "hello" }))
        .await
        .unwrap();
    assert_eq!(sent["delivered"], true);

    let history = a
        .call("get_message_history", json!({ "peerId": b_peer }))
        .await
        .unwrap();
    assert_eq!(bodies(&history), ["hello"]);

    let a_id: meshctl_net::PeerId = a_peer.parse().unwrap();
    eventually("b to record the message", || b.registry().peer_history(&a_id, 50).len() == 1)
    .await;
    let received = b
        .read_resource(&format!("meshctl://messages/peer/{a_peer}"))
        .unwrap();
    assert_eq!(received["messages"][0]["originPeerId"], a_peer);
    assert_eq!(received["messages"][0]["delivered"], false);
}

#[tokio::test]
async fn file_round_trip_keeps_size_and_sender() {
    let (_network, (a, a_peer), (b, _)) = connected_pair().await;
    let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

    let shared = a
        .call(
            "share_file",
            json!({ "fileId": "blob", "contentBase64": data_encoding::BASE64.encode(&content) }),
        )
        .await
        .unwrap();
    assert_eq!(shared["size"], 10_000);

    let fetched = b
        .call("request_file", json!({ "peerId": a_peer, "fileId": "blob" }))
        .await
        .unwrap();
    assert_eq!(fetched["size"], 10_000);
    assert_eq!(fetched["senderPeerId"], a_peer);

    let file = b.registry().file("blob").unwrap();
    assert_eq!(&file.content[..], &content[..]);

    let b_stats = b.call("get_network_stats", Value::Null).await.unwrap();
    assert_eq!(b_stats["bytesReceived"], 10_000);
    eventually("a to count the bytes it served", || {
        a.registry().counters().bytes_sent == 10_000
    })
    .await;
}

#[tokio::test]
async fn missing_file_and_silent_responder_are_told_apart() {
    let (_network, (a, a_peer), (b, b_peer)) = connected_pair().await;
    a.call("share_file", json!({ "content": "x" })).await.unwrap();

    let err = b
        .call("request_file", json!({ "peerId": a_peer, "fileId": "nope" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);

    b.lifecycle()
        .current()
        .unwrap()
        .network()
        .handle(
            Protocol::FileExchange,
            stream_handler(|stream| async move {
                let mut framed = FramedStream::new(stream);
                let _ = framed.recv().await;
                let _ = framed.close().await;
            }),
        );
    let err = a
        .call("request_file", json!({ "peerId": b_peer, "fileId": "anything" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoFileData);
}

#[tokio::test]
async fn subscribers_query_survives_unsubscribe() {
    let (_network, (a, _), (b, b_peer)) = connected_pair().await;
    b.call("subscribe_topic", json!({ "topic": "t" }))
        .await
        .unwrap();

    let subscribers = a
        .call("get_topic_subscribers", json!({ "topic": "t" }))
        .await
        .unwrap();
    assert_eq!(subscribers["subscribers"], json!([b_peer]));

    b.call("unsubscribe_topic", json!({ "topic": "t" }))
        .await
        .unwrap();
    assert!(!b.registry().is_subscribed("t"));
    let subscribers = a
        .call("get_topic_subscribers", json!({ "topic": "t" }))
        .await
        .unwrap();
    assert_eq!(subscribers["count"], 0);
}

#[tokio::test]
async fn announcing_a_file_reaches_topic_subscribers() {
    let (_network, (a, a_peer), (b, _)) = connected_pair().await;
    b.call("subscribe_topic", json!({ "topic": "meshctl/files" }))
        .await
        .unwrap();
    a.call("share_file", json!({ "fileId": "notes", "content": "abc" }))
        .await
        .unwrap();

    let announced = a
        .call("announce_file", json!({ "fileId": "notes" }))
        .await
        .unwrap();
    assert_eq!(announced["topic"], "meshctl/files");
    assert_eq!(announced["recipients"].as_array().unwrap().len(), 1);

    eventually("the announcement at b", || {
        b.registry().topic_history("meshctl/files", 1).len() == 1
    })
    .await;
    let body = &b.registry().topic_history("meshctl/files", 1)[0].body;
    let announcement: meshctl::commands::FileAnnouncement = serde_json::from_str(body).unwrap();
    assert_eq!(announcement.file_id, "notes");
    assert_eq!(announcement.size, 3);
    assert_eq!(announcement.sender_peer_id.to_string(), a_peer);
}

#[tokio::test]
async fn discovery_sees_nodes_that_start_later() {
    let network = MemoryNetwork::new();
    let (a, _) = running(&network).await;

    let discover = a.call("discover_peers", json!({ "timeout": 300 }));
    let late = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        running(&network).await
    };
    let (found, (_b, b_peer)) = tokio::join!(discover, late);
    let found = found.unwrap();
    assert_eq!(found["count"], 1);
    assert_eq!(found["discoveredPeers"][0]["peerId"], b_peer);

    let cached = a.read_resource("meshctl://peers/discovered").unwrap();
    assert_eq!(cached["count"], 1);
}

#[tokio::test]
async fn ping_reports_timeouts_instead_of_failing() {
    let (network, (a, _), (_b, b_peer)) = connected_pair().await;

    let quick = a
        .call("ping_peer", json!({ "peerId": b_peer }))
        .await
        .unwrap();
    assert_eq!(quick["timedOut"], false);
    assert!(quick["latencyMs"].is_u64());
    assert!(quick.get("elapsedMs").is_none());

    network.set_ping_latency(Duration::from_millis(500));
    let slow = a
        .call("ping_peer", json!({ "peerId": b_peer, "timeout": 20 }))
        .await
        .unwrap();
    assert_eq!(slow["timedOut"], true);
    assert!(slow["latencyMs"].is_null());
}
