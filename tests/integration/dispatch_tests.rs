//! Dispatch engine behaviour observed from the peer's side.

use std::sync::Arc;
use std::time::Duration;

use bleconfd::config::DaemonConfig;
use bleconfd::error::{Error, RegistryError};
use bleconfd::rpc::server::RpcServer;
use bleconfd::rpc::service::RpcService;
use bleconfd::services::builtin_services;
use serde_json::{Value, json};

use crate::mock_client::{NotifyingService, RecordingClient, ToolService, server_with};

fn tools() -> Vec<Box<dyn RpcService>> {
    vec![Box::new(ToolService)]
}

#[test]
fn one_response_per_identified_request() {
    let (server, client) = server_with(tools());
    let dispatch = server.spawn().unwrap();

    for id in 0..20 {
        let doc = json!({"jsonrpc": "2.0", "method": "echo", "id": id, "params": id});
        server.on_incoming_message(doc.to_string().as_bytes());
    }
    // A peer notification in the middle must not produce a reply.
    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"echo","params":"quiet"}"#);
    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"echo","id":"last"}"#);

    let sent = client.wait_for(21);
    server.stop();
    dispatch.join();

    assert_eq!(sent.len(), 21);
    let ids: Vec<Value> = sent.iter().map(|d| d["id"].clone()).collect();
    let mut expected: Vec<Value> = (0..20).map(|i| json!(i)).collect();
    expected.push(json!("last"));
    assert_eq!(ids, expected);
}

#[test]
fn responses_follow_request_order_despite_latency() {
    let (server, client) = server_with(tools());
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"sleep","id":1,"params":{"ms":80,"tag":"slow"}}"#);
    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"sleep","id":2,"params":{"ms":0,"tag":"fast"}}"#);
    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"sleep","id":3,"params":{"ms":20,"tag":"mid"}}"#);

    let sent = client.wait_for(3);
    server.stop();
    dispatch.join();

    let results: Vec<Value> = sent.iter().map(|d| d["result"].clone()).collect();
    assert_eq!(results, vec![json!("slow"), json!("fast"), json!("mid")]);
}

#[test]
fn unknown_method_with_id_is_method_not_found() {
    let (server, client) = server_with(tools());
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"bogus","id":5}"#);
    let sent = client.wait_for(1);
    server.stop();
    dispatch.join();

    assert_eq!(sent[0]["jsonrpc"], json!("2.0"));
    assert_eq!(sent[0]["id"], json!(5));
    assert_eq!(sent[0]["error"]["code"], json!(-32601));
    assert!(sent[0].get("result").is_none());
}

#[test]
fn non_json_bytes_get_parse_error_with_null_id() {
    let (server, client) = server_with(tools());
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(b"\x00\xffnot json at all");
    let sent = client.wait_for(1);
    server.stop();
    dispatch.join();

    assert_eq!(sent[0]["jsonrpc"], json!("2.0"));
    assert_eq!(sent[0]["id"], Value::Null);
    assert_eq!(sent[0]["error"]["code"], json!(-32700));
}

#[test]
fn truncated_json_keeps_salvaged_id() {
    let (server, client) = server_with(tools());
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(br#"{"jsonrpc":"2.0","id":42,"method":"echo","params":{"#);
    let sent = client.wait_for(1);
    server.stop();
    dispatch.join();

    assert_eq!(sent[0]["id"], json!(42));
    assert_eq!(sent[0]["error"]["code"], json!(-32700));
}

#[test]
fn missing_method_is_invalid_request() {
    let (server, client) = server_with(tools());
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(br#"{"jsonrpc":"2.0","id":9,"params":[]}"#);
    server.on_incoming_message(br#"{"jsonrpc":"2.0","id":10,"method":17}"#);
    server.on_incoming_message(br#"[{"jsonrpc":"2.0","id":11,"method":"echo"}]"#);
    let sent = client.wait_for(3);
    server.stop();
    dispatch.join();

    assert_eq!(sent[0]["id"], json!(9));
    assert_eq!(sent[0]["error"]["code"], json!(-32600));
    assert_eq!(sent[1]["id"], json!(10));
    assert_eq!(sent[1]["error"]["code"], json!(-32600));
    assert_eq!(sent[2]["id"], Value::Null);
    assert_eq!(sent[2]["error"]["code"], json!(-32600));
}

#[test]
fn handler_errors_and_panics_are_contained() {
    let (server, client) = server_with(tools());
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"fail","id":1}"#);
    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"panic","id":2}"#);
    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"panic"}"#);
    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"echo","id":3,"params":"alive"}"#);
    let sent = client.wait_for(3);
    server.stop();
    dispatch.join();

    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0]["error"]["code"], json!(1007));
    assert_eq!(sent[0]["error"]["message"], json!("nope"));
    assert_eq!(sent[1]["error"]["code"], json!(-32603));
    assert_eq!(sent[2]["result"], json!("alive"));
    assert_eq!(server.stats().handler_faults, 2);
}

#[test]
fn wifi_get_status_returns_result() {
    let config = DaemonConfig::default();
    let (server, client) = server_with(builtin_services(&config));
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"wifi-get-status","id":1234}"#);
    let sent = client.wait_for(1);
    server.stop();
    dispatch.join();

    assert_eq!(sent[0]["id"], json!(1234));
    assert!(sent[0].get("error").is_none());
    assert_eq!(sent[0]["result"]["state"], json!(0x0101));
}

#[test]
fn transport_failures_do_not_stop_dispatch() {
    let (server, client) = server_with(tools());
    client.reject_sends();
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"echo","id":1}"#);
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while server.stats().dropped == 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(server.is_running());
    server.stop();
    dispatch.join();
    assert_eq!(server.stats().dropped, 1);
}

#[test]
fn duplicate_method_aborts_registration() {
    let mut server = RpcServer::new(Arc::new(DaemonConfig::default()));
    let (first, _) = NotifyingService::new("dup");
    let (second, _) = NotifyingService::new("dup");
    server.register_service(Box::new(first)).unwrap();

    let err = server.register_service(Box::new(second)).unwrap_err();
    assert!(matches!(
        err,
        Error::Registry(RegistryError::DuplicateMethod { ref method, .. }) if method == "dup-ping"
    ));
    assert_eq!(server.registry().len(), 1);
    assert_eq!(server.service_names(), vec!["dup"]);
}

#[test]
fn builtin_services_register_cleanly() {
    let config = DaemonConfig::default();
    let mut server = RpcServer::new(Arc::new(config.clone()));
    for svc in builtin_services(&config) {
        server.register_service(svc).unwrap();
    }
    assert_eq!(
        server.registry().method_names(),
        vec![
            "dev-info-get",
            "wifi-connect",
            "wifi-disconnect",
            "wifi-get-status",
            "wifi-status-codes",
        ]
    );
    let _ = RecordingClient::new();
}
