//! Server-initiated notifications: shape, threading and interleaving.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use bleconfd::rpc::message::Notification;
use bleconfd::rpc::service::RpcService;
use serde_json::{Value, json};

use crate::mock_client::{NotifyingService, RecordingClient, ToolService, server_with, server_with_client};

#[test]
fn status_notification_has_no_id() {
    let (svc, slot) = NotifyingService::new("wifi");
    let (server, client) = server_with(vec![Box::new(svc)]);

    let notifier = slot.lock().unwrap().clone().unwrap();
    assert!(notifier.notify("wifi-status-changed", json!({"state": 260})));

    assert_eq!(
        client.sent(),
        vec![json!({"jsonrpc": "2.0", "method": "wifi-status-changed", "params": {"state": 260}})]
    );
    assert_eq!(server.stats().sent, 1);
}

#[test]
fn enqueue_async_message_bypasses_the_queue() {
    let (server, client) = server_with(vec![Box::new(ToolService)]);
    // No dispatch loop running: the notification still goes out.
    assert!(server.enqueue_async_message(&Notification::new("tick", json!([1]))));
    assert_eq!(client.sent()[0]["method"], json!("tick"));
}

#[test]
fn notifier_without_client_drops_silently() {
    let (svc, slot) = NotifyingService::new("orphan");
    let (server, _client) = server_with(vec![Box::new(svc)]);
    server.clear_client();

    let notifier = slot.lock().unwrap().clone().unwrap();
    assert!(!notifier.notify("evt", Value::Null));
    assert_eq!(server.stats().dropped, 1);
}

#[test]
fn concurrent_notifications_and_response_never_interleave() {
    let (a, slot_a) = NotifyingService::new("alpha");
    let (b, slot_b) = NotifyingService::new("beta");
    let services: Vec<Box<dyn RpcService>> = vec![Box::new(a), Box::new(b), Box::new(ToolService)];
    let (server, client) = server_with_client(services, RecordingClient::with_write_delay(Duration::from_millis(5)));
    let dispatch = server.spawn().unwrap();

    let start = Arc::new(Barrier::new(3));
    let workers: Vec<_> = [(slot_a, "alpha-evt"), (slot_b, "beta-evt")]
        .into_iter()
        .map(|(slot, method)| {
            let notifier = slot.lock().unwrap().clone().unwrap();
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                notifier.notify(method, json!({"payload": "x".repeat(512)}))
            })
        })
        .collect();

    start.wait();
    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"echo","id":77,"params":"reply"}"#);
    for w in workers {
        assert!(w.join().unwrap());
    }

    let sent = client.wait_for(3);
    server.stop();
    dispatch.join();

    assert_eq!(sent.len(), 3);
    let mut methods: Vec<String> = sent
        .iter()
        .filter_map(|d| d.get("method").and_then(Value::as_str).map(str::to_owned))
        .collect();
    methods.sort();
    assert_eq!(methods, vec!["alpha-evt", "beta-evt"]);
    let response = sent.iter().find(|d| d.get("id").is_some()).unwrap();
    assert_eq!(response["result"], json!("reply"));
}
