#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use metricws_core::error::{MwsError, Result};
use metricws_core::protocol::{ResponseEnvelope, ResponseType};
use metricws_gateway::config::GatewayConfig;
use metricws_gateway::demux::{self, Demuxed};
use metricws_gateway::dispatch::{DispatchOutcome, OpCall, OpHandler, Reply, SubscriptionTable};
use metricws_gateway::services::Heartbeat;
use metricws_gateway::transport::{Connection, Outbound};
use metricws_gateway::AppState;

fn peer() -> SocketAddr {
    "127.0.0.1:40001".parse().unwrap()
}

fn open(id: u64) -> (Connection, mpsc::Receiver<Outbound>) {
    Connection::open(id, peer(), 16)
}

fn next_json(rx: &mut mpsc::Receiver<Outbound>) -> Value {
    let out = rx.try_recv().expect("a frame should be queued");
    match out.msg {
        Message::Text(t) => serde_json::from_str(&t).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

fn nothing_queued(rx: &mut mpsc::Receiver<Outbound>) -> bool {
    rx.try_recv().is_err()
}

async fn send(state: &AppState, conn: &Connection, text: &str) -> Demuxed {
    demux::on_frame(state, conn, Message::Text(text.to_string())).await
}

#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
}

#[async_trait]
impl OpHandler for Counting {
    async fn handle(&self, call: OpCall) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        call.reply().set_content(&json!({"seen": call.id()}))?.send()?;
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl OpHandler for Failing {
    async fn handle(&self, _call: OpCall) -> Result<()> {
        Err(MwsError::BadRequest("nothing to see".into()))
    }
}

struct Panicking;

#[async_trait]
impl OpHandler for Panicking {
    async fn handle(&self, _call: OpCall) -> Result<()> {
        panic!("op exploded")
    }
}

#[tokio::test]
async fn ping_answers_pong_with_echoed_id() {
    let state = AppState::new(GatewayConfig::default()).unwrap();
    let (conn, mut rx) = open(1);

    let out = send(&state, &conn, r#"{"id":1,"op":"ping","type":"req"}"#).await;
    assert!(matches!(out, Demuxed::Dispatched(DispatchOutcome::Handled)));

    let v = next_json(&mut rx);
    assert_eq!(v["rerid"], 1);
    assert_eq!(v["t"], "resp");
    assert_eq!(v["op"], "ping");
    assert_eq!(v["msg"], "pong");
    assert!(v["id"].is_u64());
    assert_eq!(state.counters().snapshot().ws_requests, 1);
}

#[tokio::test]
async fn unknown_op_is_an_error_envelope() {
    let counting = Arc::new(Counting::default());
    let state = AppState::builder(GatewayConfig::default())
        .with_op("count", counting.clone())
        .unwrap()
        .build();
    let (conn, mut rx) = open(1);

    let out = send(&state, &conn, r#"{"id":2,"op":"nope","type":"req"}"#).await;
    assert!(matches!(out, Demuxed::Dispatched(DispatchOutcome::UnknownOp)));

    let v = next_json(&mut rx);
    assert_eq!(v["rerid"], 2);
    assert_eq!(v["t"], "err");
    assert_eq!(v["op"], "nope");
    assert!(v["msg"].as_str().unwrap().contains("no such operation"));
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    assert_eq!(state.metrics().unknown_ops.get(&[]), 1);
}

#[tokio::test]
async fn op_names_are_case_sensitive() {
    let state = AppState::new(GatewayConfig::default()).unwrap();
    let (conn, mut rx) = open(1);
    send(&state, &conn, r#"{"id":3,"op":"PING"}"#).await;
    assert_eq!(next_json(&mut rx)["t"], "err");
}

#[tokio::test]
async fn known_op_is_invoked_exactly_once() {
    let counting = Arc::new(Counting::default());
    let state = AppState::builder(GatewayConfig::default())
        .with_op("count", counting.clone())
        .unwrap()
        .build();
    let (conn, mut rx) = open(1);

    send(&state, &conn, r#"{"id":77,"op":"count","type":"mreq","payload":[1]}"#).await;

    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    let v = next_json(&mut rx);
    assert_eq!(v["rerid"], 77);
    assert_eq!(v["msg"]["seen"], 77);
    assert!(nothing_queued(&mut rx));
}

#[test]
fn duplicate_op_registration_is_an_error() {
    let err = AppState::builder(GatewayConfig::default())
        .with_op("ping", Arc::new(Counting::default()))
        .unwrap()
        .with_op("ping", Arc::new(Counting::default()))
        .err()
        .expect("duplicate must fail");
    assert_eq!(err.client_code().as_str(), "DUPLICATE");
}

#[tokio::test]
async fn handler_error_and_panic_become_err_envelopes() {
    let state = AppState::builder(GatewayConfig::default())
        .with_op("fail", Arc::new(Failing))
        .unwrap()
        .with_op("panic", Arc::new(Panicking))
        .unwrap()
        .build();
    let (conn, mut rx) = open(1);

    send(&state, &conn, r#"{"id":10,"op":"fail"}"#).await;
    let v = next_json(&mut rx);
    assert_eq!((v["rerid"].as_i64(), v["t"].as_str()), (Some(10), Some("err")));
    assert!(v["msg"].as_str().unwrap().contains("nothing to see"));

    send(&state, &conn, r#"{"id":11,"op":"panic"}"#).await;
    let v = next_json(&mut rx);
    assert_eq!((v["rerid"].as_i64(), v["t"].as_str()), (Some(11), Some("err")));
    assert!(v["msg"].as_str().unwrap().contains("op exploded"));

    assert_eq!(state.counters().snapshot().errors, 2);
}

#[tokio::test]
async fn malformed_envelopes_answer_with_what_was_parseable() {
    let state = AppState::new(GatewayConfig::default()).unwrap();
    let (conn, mut rx) = open(1);

    send(&state, &conn, "{not json").await;
    let v = next_json(&mut rx);
    assert_eq!((v["rerid"].as_i64(), v["t"].as_str()), (Some(0), Some("err")));

    send(&state, &conn, r#"{"id":5,"type":"req"}"#).await;
    let v = next_json(&mut rx);
    assert_eq!((v["rerid"].as_i64(), v["t"].as_str()), (Some(5), Some("err")));

    send(&state, &conn, r#"{"id":"five","op":"ping"}"#).await;
    let v = next_json(&mut rx);
    assert_eq!(v["rerid"], 0);
    assert_eq!(v["op"], "ping");

    assert_eq!(state.counters().snapshot().ws_requests, 0);
    assert_eq!(state.metrics().decode_errors.get(&[]), 3);
}

#[tokio::test]
async fn non_text_frames_pass_through() {
    let state = AppState::new(GatewayConfig::default()).unwrap();
    let (conn, mut rx) = open(1);

    let out = demux::on_frame(&state, &conn, Message::Binary(vec![1, 2, 3])).await;
    assert!(matches!(out, Demuxed::Passthrough(Message::Binary(_))));
    assert!(nothing_queued(&mut rx));
    assert_eq!(state.counters().snapshot().ws_requests, 0);
}

#[tokio::test]
async fn subscribe_publish_unsubscribe() {
    let state = AppState::new(GatewayConfig::default()).unwrap();
    let (conn, mut rx) = open(1);

    send(&state, &conn, r#"{"id":5,"op":"heartbeat","type":"sub"}"#).await;
    let ack = next_json(&mut rx);
    assert_eq!((ack["rerid"].as_i64(), ack["t"].as_str()), (Some(5), Some("resp")));
    assert!(state.subscriptions().is_subscribed(1, 5));

    assert_eq!(Heartbeat::beat(&state, 1).unwrap(), 1);
    let ev = next_json(&mut rx);
    assert_eq!(ev["rerid"], 5);
    assert_eq!(ev["t"], "sub");
    assert_eq!(ev["op"], "heartbeat");
    assert_eq!(ev["msg"]["seq"], 1);

    send(&state, &conn, r#"{"id":5,"op":"heartbeat","type":"xsub"}"#).await;
    let ack = next_json(&mut rx);
    assert_eq!((ack["rerid"].as_i64(), ack["t"].as_str()), (Some(5), Some("resp")));
    assert!(!state.subscriptions().is_subscribed(1, 5));

    assert_eq!(Heartbeat::beat(&state, 2).unwrap(), 0);
    assert!(nothing_queued(&mut rx));
}

#[tokio::test]
async fn duplicate_subscription_is_rejected() {
    let state = AppState::new(GatewayConfig::default()).unwrap();
    let (conn, mut rx) = open(1);

    send(&state, &conn, r#"{"id":5,"op":"heartbeat","type":"sub"}"#).await;
    next_json(&mut rx);

    let out = send(&state, &conn, r#"{"id":5,"op":"heartbeat","type":"sub"}"#).await;
    assert!(matches!(out, Demuxed::Dispatched(DispatchOutcome::Rejected(_))));
    let v = next_json(&mut rx);
    assert_eq!((v["rerid"].as_i64(), v["t"].as_str()), (Some(5), Some("err")));

    // the original subscription still receives events
    assert_eq!(state.subscriptions().len(), 1);
    assert_eq!(Heartbeat::beat(&state, 1).unwrap(), 1);
}

#[tokio::test]
async fn failed_subscribe_is_rolled_back() {
    let state = AppState::new(GatewayConfig::default()).unwrap();
    let (conn, mut rx) = open(1);

    // ping refuses sub
    send(&state, &conn, r#"{"id":8,"op":"ping","type":"sub"}"#).await;
    assert_eq!(next_json(&mut rx)["t"], "err");
    assert!(state.subscriptions().is_empty());
}

#[tokio::test]
async fn purge_drops_every_subscription_of_a_connection() {
    let subs = SubscriptionTable::new();
    let (a, mut a_rx) = open(1);
    let (b, mut b_rx) = open(2);

    subs.subscribe(&a, 1, "ticks").unwrap();
    subs.subscribe(&a, 2, "ticks").unwrap();
    subs.subscribe(&a, 3, "other").unwrap();
    subs.subscribe(&b, 1, "ticks").unwrap();
    assert_eq!(subs.subscribers("ticks").len(), 3);

    a.close();
    assert_eq!(subs.purge(a.id()), 3);
    assert_eq!(subs.purge(a.id()), 0);
    assert!(subs.subscribers("other").is_empty());

    assert_eq!(subs.publish("ticks", &json!({"n": 1})).unwrap(), 1);
    assert!(nothing_queued(&mut a_rx));
    assert_eq!(next_json(&mut b_rx)["t"], "sub");
}

#[tokio::test]
async fn publish_skips_closed_connections_without_error() {
    let subs = SubscriptionTable::new();
    let (a, mut a_rx) = open(1);
    let (b, mut b_rx) = open(2);
    subs.subscribe(&a, 1, "ticks").unwrap();
    subs.subscribe(&b, 9, "ticks").unwrap();

    b.close();
    assert_eq!(subs.publish("ticks", &42).unwrap(), 1);

    let v = next_json(&mut a_rx);
    assert_eq!((v["rerid"].as_i64(), v["msg"].as_i64()), (Some(1), Some(42)));
    assert!(nothing_queued(&mut b_rx));
}

#[tokio::test]
async fn reply_send_to_skips_unwritable_targets() {
    let (a, mut a_rx) = open(1);
    let (b, mut b_rx) = open(2);
    let (c, mut c_rx) = open(3);
    c.close();

    let mut reply = Reply::new(ResponseEnvelope::new(0, ResponseType::Event), a.clone());
    reply.set_op("news").set_content("hello").unwrap();

    let deliveries = reply.send_to(&[a.clone(), b.clone(), c.clone()]).unwrap();
    let ids: Vec<u64> = deliveries.iter().map(|d| d.conn_id()).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(next_json(&mut a_rx)["msg"], "hello");
    assert_eq!(next_json(&mut b_rx)["op"], "news");
    assert!(nothing_queued(&mut c_rx));
}

#[tokio::test]
async fn delivery_resolves_when_writer_acks() {
    let (a, mut rx) = open(1);
    let delivery = Reply::new(ResponseEnvelope::new(4, ResponseType::Response), a)
        .send()
        .unwrap()
        .pop()
        .unwrap();

    let out = rx.recv().await.unwrap();
    out.done.unwrap().send(true).unwrap();
    assert!(delivery.flushed().await);
}

#[tokio::test]
async fn promote_keeps_correlation_and_target() {
    let (a, mut rx) = open(1);
    let mut ack = Reply::new(ResponseEnvelope::new(12, ResponseType::Response), a);
    ack.set_op("feed").set_content("ok").unwrap();
    ack.send().unwrap();

    let mut push = ack.promote(ResponseType::Event);
    push.set_content(&json!({"tick": 1})).unwrap();
    push.send().unwrap();

    let first = next_json(&mut rx);
    let second = next_json(&mut rx);
    assert_eq!(first["t"], "resp");
    assert_eq!(second["t"], "sub");
    assert_eq!(second["rerid"], 12);
    assert_eq!(second["op"], "feed");
    assert_ne!(first["id"], second["id"]);
}

#[tokio::test]
async fn range_streams_an_array() {
    let state = AppState::new(GatewayConfig::default()).unwrap();
    let (conn, mut rx) = open(1);

    send(&state, &conn, r#"{"id":9,"op":"range","payload":{"count":4}}"#).await;
    let v = next_json(&mut rx);
    assert_eq!(v["rerid"], 9);
    assert_eq!(v["t"], "resp");
    assert_eq!(v["msg"], json!([0, 1, 2, 3]));

    send(&state, &conn, r#"{"id":10,"op":"range","payload":{"count":0}}"#).await;
    assert_eq!(next_json(&mut rx)["msg"], json!([]));

    send(&state, &conn, r#"{"id":11,"op":"range"}"#).await;
    assert_eq!(next_json(&mut rx)["t"], "err");
}

#[tokio::test]
async fn echo_splits_mreq_arrays() {
    let state = AppState::new(GatewayConfig::default()).unwrap();
    let (conn, mut rx) = open(1);

    send(&state, &conn, r#"{"id":3,"op":"echo","type":"mreq","payload":["a","b"]}"#).await;
    assert_eq!(next_json(&mut rx)["msg"], "a");
    assert_eq!(next_json(&mut rx)["msg"], "b");
    assert!(nothing_queued(&mut rx));

    send(&state, &conn, r#"{"id":4,"op":"echo","payload":{"k":[1,2]}}"#).await;
    let v = next_json(&mut rx);
    assert_eq!(v["rerid"], 4);
    assert_eq!(v["msg"], json!({"k": [1, 2]}));
}

#[tokio::test]
async fn connection_option_bag() {
    let (a, _rx) = open(1);
    let other_task = a.clone();

    assert!(a.set_option("compress", json!(true)).is_none());
    let seen = tokio::spawn(async move { other_task.option("compress") })
        .await
        .unwrap();
    assert_eq!(seen, Some(json!(true)));

    assert_eq!(a.remove_option("compress"), Some(json!(true)));
    a.set_option("x", json!(1));
    a.clear_options();
    assert!(a.option("x").is_none());
}

#[tokio::test]
async fn closed_connection_is_not_writable() {
    let (a, _rx) = open(1);
    assert!(a.is_writable());
    a.close();
    assert!(!a.is_writable());
    assert!(a.write(Message::Text("x".into())).is_none());
    // resolves immediately once closed
    a.closed().await;
}
