//! `stop()` semantics and reconnect re-arming.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use bleconfd::rpc::service::RpcService;
use bleconfd::rpc::transport::ConnectedClient;
use serde_json::json;

use crate::mock_client::{GateService, RecordingClient, ToolService, server_with};

#[test]
fn stop_returns_promptly_from_idle_loop() {
    let (server, _client) = server_with(vec![Box::new(ToolService)]);
    let dispatch = server.spawn().unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    server.stop();
    dispatch.join();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!server.is_running());
}

#[test]
fn queued_entries_are_discarded_on_stop() {
    let (gate, release, entered) = GateService::new();
    let services: Vec<Box<dyn RpcService>> = vec![Box::new(gate), Box::new(ToolService)];
    let (server, client) = server_with(services);
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"gate-wait","id":1}"#);
    let deadline = Instant::now() + Duration::from_secs(2);
    while !entered.load(Ordering::Acquire) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"echo","id":2}"#);
    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"echo","id":3}"#);

    server.stop();
    release();
    dispatch.join();

    let ids: Vec<_> = client.sent().iter().map(|d| d["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1)], "only the in-flight request completes");
    assert_eq!(server.stats().discarded, 2);
}

#[test]
fn messages_after_stop_are_ignored() {
    let (server, client) = server_with(vec![Box::new(ToolService)]);
    let dispatch = server.spawn().unwrap();
    server.stop();
    dispatch.join();

    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"echo","id":1}"#);
    thread::sleep(Duration::from_millis(20));
    assert!(client.sent().is_empty());
}

#[test]
fn set_client_rearms_for_next_connection() {
    let (server, first) = server_with(vec![Box::new(ToolService)]);
    let dispatch = server.spawn().unwrap();
    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"echo","id":"a"}"#);
    first.wait_for(1);
    server.stop();
    dispatch.join();
    server.clear_client();

    let second = RecordingClient::new();
    server.set_client(second.clone() as std::sync::Arc<dyn ConnectedClient>);
    let dispatch = server.spawn().unwrap();
    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"echo","id":"b"}"#);
    let sent = second.wait_for(1);
    server.stop();
    dispatch.join();

    assert_eq!(first.sent().len(), 1);
    assert_eq!(sent[0]["id"], json!("b"));
}
