//! WiFi provisioning service (`wifi`).
//!
//! `wifi-connect` only validates and accepts; association runs on a
//! `wifi-connect` worker thread that reports every step as a
//! `wifi-status-changed` notification:
//!
//! ```text
//! 0x0102 processing ─▶ 0x0103 connecting ─▶ 0x0104 connected
//!      ─▶ 0x0105 acquiring IP ─▶ 0x0106 IP acquired ─▶ 0x09ff complete
//!             │                      │
//!             └─▶ 0x0a01 unknown     └─▶ 0x0a04 acquire-IP timeout
//! ```
//!
//! `wifi-disconnect` bumps a generation counter; a worker that sees a
//! newer generation stops without reporting further steps and drops the
//! link itself. Every status is also published to the transport's polled
//! status attribute (GATT provision-state).

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;

use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{Value, json};

use super::status::ProvisionStatus;
use crate::adapters::wifi::{ConnectivityPort, validate_password, validate_ssid};
use crate::config::DaemonConfig;
use crate::error::{ConnectivityError, ServiceError};
use crate::rpc::message::RpcError;
use crate::rpc::registry::RpcMethod;
use crate::rpc::service::{Notifier, RpcService};

pub const SERVICE_NAME: &str = "wifi";

pub const METHOD_GET_STATUS: &str = "wifi-get-status";
pub const METHOD_CONNECT: &str = "wifi-connect";
pub const METHOD_DISCONNECT: &str = "wifi-disconnect";
pub const METHOD_STATUS_CODES: &str = "wifi-status-codes";

/// Server-initiated notification carrying `{ "state": <code> }`.
pub const NOTIFY_STATUS_CHANGED: &str = "wifi-status-changed";

/// `wifi-connect` while a previous attempt is still running.
pub const ERR_CONNECT_IN_PROGRESS: i64 = 1;

#[derive(Debug, Deserialize)]
struct ConnectParams {
    ssid: String,
    #[serde(default)]
    password: String,
}

/// Reported status and the attempt generation it belongs to, under one
/// lock so a superseded attempt can never overwrite a newer status.
struct Progress {
    status: ProvisionStatus,
    generation: u64,
}

/// State shared between handlers and the connect worker.
struct Station {
    port: Mutex<Box<dyn ConnectivityPort>>,
    progress: Mutex<Progress>,
    ssid: Mutex<String>,
    busy: AtomicBool,
    notifier: Notifier,
    timeout_secs: u32,
}

impl Station {
    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> ProvisionStatus {
        self.progress().status
    }

    /// Record and announce `status`. Called with the progress lock held so
    /// notifications leave in the order statuses were recorded.
    fn report(&self, progress: &mut Progress, status: ProvisionStatus) {
        progress.status = status;
        info!("WiFi: status {}", status);
        self.notifier.publish_state(status.code());
        self.notifier
            .notify(NOTIFY_STATUS_CHANGED, json!({ "state": status.code() }));
    }

    fn set_status(&self, status: ProvisionStatus) {
        let mut progress = self.progress();
        self.report(&mut progress, status);
    }

    /// Like [`set_status`](Self::set_status), unless a disconnect superseded `generation`.
    fn advance(&self, generation: u64, status: ProvisionStatus) -> bool {
        let mut progress = self.progress();
        if progress.generation != generation {
            info!("WiFi: attempt superseded, not reporting {}", status);
            return false;
        }
        self.report(&mut progress, status);
        true
    }

    fn get_status(&self) -> Value {
        let status = self.status();
        let ssid = self.ssid.lock().unwrap_or_else(PoisonError::into_inner).clone();

        // The worker holds the port while it blocks; report link details
        // as unknown rather than stalling the dispatch loop.
        let (connected, rssi, ip) = match self.port.try_lock() {
            Ok(port) => (port.is_connected(), port.rssi(), port.ip_address()),
            Err(TryLockError::Poisoned(p)) => {
                let port = p.into_inner();
                (port.is_connected(), port.rssi(), port.ip_address())
            }
            Err(TryLockError::WouldBlock) => (false, None, None),
        };

        json!({
            "state": status.code(),
            "description": status.description(),
            "ssid": ssid,
            "connected": connected,
            "rssi": rssi,
            "ip": ip.map(|ip| ip.to_string()),
        })
    }

    fn connect(self: &Arc<Self>, params: &Value) -> Result<Value, RpcError> {
        let request = match ConnectParams::deserialize(params) {
            Ok(p) => p,
            Err(e) => return Err(self.reject(format!("expected {{ssid, password}}: {e}"))),
        };
        if let Err(e) = validate_ssid(&request.ssid).and(validate_password(&request.password)) {
            return Err(self.reject(e.to_string()));
        }

        if self.busy.swap(true, Ordering::AcqRel) {
            warn!("WiFi: connect rejected, attempt already running");
            return Err(RpcError::application(
                ERR_CONNECT_IN_PROGRESS,
                "connect already in progress",
            ));
        }

        *self.ssid.lock().unwrap_or_else(PoisonError::into_inner) = request.ssid.clone();
        let generation = self.progress().generation;
        let station = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("wifi-connect".into())
            .spawn(move || {
                station.run_attempt(generation, &request.ssid, &request.password);
                station.busy.store(false, Ordering::Release);
            });

        match spawned {
            Ok(_) => Ok(json!({ "accepted": true })),
            Err(e) => {
                self.busy.store(false, Ordering::Release);
                error!("WiFi: failed to start connect worker: {}", e);
                Err(RpcError::internal(format!("connect worker: {e}")))
            }
        }
    }

    fn reject(&self, reason: String) -> RpcError {
        warn!("WiFi: malformed configuration: {}", reason);
        self.set_status(ProvisionStatus::MalformedConfiguration);
        RpcError::invalid_params(reason)
    }

    fn run_attempt(&self, generation: u64, ssid: &str, password: &str) {
        let mut port = self.port.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.advance(generation, ProvisionStatus::ProcessingConfiguration) {
            return;
        }
        if let Err(e) = port.set_credentials(ssid, password) {
            warn!("WiFi: credentials refused: {}", e);
            self.advance(generation, ProvisionStatus::MalformedConfiguration);
            return;
        }
        // Re-provisioning replaces any existing association.
        port.disconnect();

        if !self.advance(generation, ProvisionStatus::Connecting) {
            return;
        }
        if let Err(e) = port.connect() {
            error!("WiFi: association failed: {}", e);
            self.advance(generation, ProvisionStatus::UnknownError);
            return;
        }

        // From here on a superseded attempt owns taking the link down:
        // `disconnect` could not reach the port while we held it.
        if !self.advance(generation, ProvisionStatus::Connected)
            || !self.advance(generation, ProvisionStatus::AcquiringIp)
        {
            port.disconnect();
            return;
        }
        let ip: Ipv4Addr = match port.acquire_ip(self.timeout_secs) {
            Ok(ip) => ip,
            Err(ConnectivityError::AddressTimeout(secs)) => {
                error!("WiFi: no address after {} s", secs);
                self.advance(generation, ProvisionStatus::AcquireIpTimeout);
                return;
            }
            Err(e) => {
                error!("WiFi: address acquisition failed: {}", e);
                self.advance(generation, ProvisionStatus::UnknownError);
                return;
            }
        };
        if !self.advance(generation, ProvisionStatus::IpAcquired) {
            port.disconnect();
            return;
        }
        info!("WiFi: {} up with {}", ssid, ip);
        drop(port);

        if !self.advance(generation, ProvisionStatus::SetupComplete) {
            self.port
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .disconnect();
        }
    }

    /// Never waits for a running attempt: the generation bump and the new
    /// status are recorded at once, and the link is dropped here only when
    /// the port is free.
    fn disconnect(&self) -> Value {
        {
            let mut progress = self.progress();
            progress.generation = progress.generation.wrapping_add(1);
            self.report(&mut progress, ProvisionStatus::AwaitingConfiguration);
        }
        match self.port.try_lock() {
            Ok(mut port) => port.disconnect(),
            Err(TryLockError::Poisoned(p)) => p.into_inner().disconnect(),
            Err(TryLockError::WouldBlock) => info!("WiFi: attempt running, it will drop the link"),
        }
        json!({ "state": ProvisionStatus::AwaitingConfiguration.code() })
    }
}

fn status_codes() -> Value {
    let table: Vec<Value> = ProvisionStatus::ALL
        .iter()
        .map(|s| json!({ "code": s.code(), "description": s.description() }))
        .collect();
    Value::Array(table)
}

pub struct WifiService {
    port: Option<Mutex<Box<dyn ConnectivityPort>>>,
    station: Option<Arc<Station>>,
}

impl WifiService {
    pub fn new(port: Box<dyn ConnectivityPort>) -> Self {
        Self {
            port: Some(Mutex::new(port)),
            station: None,
        }
    }
}

impl RpcService for WifiService {
    fn init(&mut self, config: &DaemonConfig, notifier: Notifier) -> Result<(), ServiceError> {
        let port = self.port.take().ok_or_else(|| ServiceError::Init {
            service: SERVICE_NAME.into(),
            reason: "already initialised".into(),
        })?;
        info!("WiFi: managing {}", config.wifi.interface);
        self.station = Some(Arc::new(Station {
            port,
            progress: Mutex::new(Progress {
                status: ProvisionStatus::AwaitingConfiguration,
                generation: 0,
            }),
            ssid: Mutex::new(String::new()),
            busy: AtomicBool::new(false),
            notifier,
            timeout_secs: config.wifi.connect_timeout_secs,
        }));
        Ok(())
    }

    fn name(&self) -> &str {
        SERVICE_NAME
    }

    fn method_names(&self) -> Vec<String> {
        [METHOD_GET_STATUS, METHOD_CONNECT, METHOD_DISCONNECT, METHOD_STATUS_CODES]
            .iter()
            .map(|m| (*m).to_owned())
            .collect()
    }

    fn method(&self, name: &str) -> Option<RpcMethod> {
        let station = Arc::clone(self.station.as_ref()?);
        let method: RpcMethod = match name {
            METHOD_GET_STATUS => Arc::new(move |_: &Value| Ok(station.get_status())),
            METHOD_CONNECT => Arc::new(move |params: &Value| station.connect(params)),
            METHOD_DISCONNECT => Arc::new(move |_: &Value| Ok(station.disconnect())),
            METHOD_STATUS_CODES => Arc::new(|_: &Value| Ok(status_codes())),
            _ => return None,
        };
        Some(method)
    }
}
