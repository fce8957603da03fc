//! End-to-end WiFi provisioning through the dispatcher.
//!
//! Verifies the sequence a phone app sees: request accepted, then one
//! `wifi-status-changed` notification per step, ending in setup-complete.

use std::time::{Duration, Instant};

use bleconfd::adapters::wifi::SimWifi;
use bleconfd::config::WifiConfig;
use bleconfd::rpc::service::RpcService;
use bleconfd::services::device_info::DeviceInfoService;
use bleconfd::services::status::ProvisionStatus;
use bleconfd::services::wifi::{NOTIFY_STATUS_CHANGED, WifiService};
use serde_json::{Value, json};

use crate::mock_client::{RecordingClient, server_with};

fn wifi(sim: SimWifi) -> Vec<Box<dyn RpcService>> {
    vec![Box::new(DeviceInfoService::new()), Box::new(WifiService::new(Box::new(sim)))]
}

fn states(client: &RecordingClient) -> Vec<u64> {
    client
        .notifications(NOTIFY_STATUS_CHANGED)
        .iter()
        .map(|n| n["params"]["state"].as_u64().unwrap())
        .collect()
}

fn wait_for_state(client: &RecordingClient, code: u16) -> Vec<u64> {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let seen = states(client);
        if seen.contains(&u64::from(code)) || Instant::now() > deadline {
            return seen;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn fast_sim(config: &WifiConfig) -> SimWifi {
    SimWifi::new(config).with_latency(Duration::from_millis(1))
}

#[test]
fn provisioning_full_flow() {
    let (server, client) = server_with(wifi(fast_sim(&WifiConfig::default())));
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(
        br#"{"jsonrpc":"2.0","method":"wifi-connect","id":1,"params":{"ssid":"HomeNet","password":"hunter22"}}"#,
    );
    let seen = wait_for_state(&client, ProvisionStatus::SetupComplete.code());

    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"wifi-get-status","id":2}"#);
    let deadline = Instant::now() + Duration::from_secs(2);
    while client.responses().len() < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    server.stop();
    dispatch.join();

    assert_eq!(seen, vec![0x0102, 0x0103, 0x0104, 0x0105, 0x0106, 0x09ff]);

    let responses = client.responses();
    assert_eq!(responses[0], json!({"jsonrpc": "2.0", "id": 1, "result": {"accepted": true}}));
    let status = &responses[1]["result"];
    assert_eq!(status["state"], json!(0x09ff));
    assert_eq!(status["ssid"], json!("HomeNet"));
    assert_eq!(status["connected"], json!(true));
}

#[test]
fn malformed_configuration_is_rejected_and_notified() {
    let (server, client) = server_with(wifi(fast_sim(&WifiConfig::default())));
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(
        br#"{"jsonrpc":"2.0","method":"wifi-connect","id":1,"params":{"ssid":"","password":"hunter22"}}"#,
    );
    client.wait_for(2);
    server.stop();
    dispatch.join();

    let responses = client.responses();
    assert_eq!(responses[0]["error"]["code"], json!(-32602));
    assert_eq!(states(&client), vec![0x0a03]);
}

#[test]
fn association_failure_ends_in_unknown_error() {
    let config = WifiConfig {
        simulate_failure: true,
        ..WifiConfig::default()
    };
    let (server, client) = server_with(wifi(fast_sim(&config)));
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(
        br#"{"jsonrpc":"2.0","method":"wifi-connect","id":1,"params":{"ssid":"Cafe","password":""}}"#,
    );
    let seen = wait_for_state(&client, ProvisionStatus::UnknownError.code());
    server.stop();
    dispatch.join();

    assert_eq!(seen, vec![0x0102, 0x0103, 0x0a01]);
}

#[test]
fn disconnect_resets_to_awaiting_configuration() {
    let (server, client) = server_with(wifi(fast_sim(&WifiConfig::default())));
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"wifi-disconnect","id":"d"}"#);
    client.wait_for(2);
    server.stop();
    dispatch.join();

    assert_eq!(client.responses()[0]["result"], json!({"state": 0x0101}));
    assert_eq!(states(&client), vec![0x0101]);
}

#[test]
fn device_info_reports_identity() {
    let (server, client) = server_with(wifi(fast_sim(&WifiConfig::default())));
    let dispatch = server.spawn().unwrap();

    server.on_incoming_message(br#"{"jsonrpc":"2.0","method":"dev-info-get","id":1}"#);
    let sent = client.wait_for(1);
    server.stop();
    dispatch.join();

    let info: &Value = &sent[0]["result"];
    assert_eq!(info["deviceId"], json!("BC-EFCAFE"));
    assert_eq!(info["hostname"], json!("bleconfd-efcafe"));
}
