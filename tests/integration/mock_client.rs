//! Recording client and test services.
//!
//! [`RecordingClient`] stands in for the Bluetooth peer: every document
//! the server sends is parsed and kept in arrival order, so tests can
//! assert on the complete outbound history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, channel};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bleconfd::config::DaemonConfig;
use bleconfd::error::{ServiceError, TransportError};
use bleconfd::rpc::message::RpcError;
use bleconfd::rpc::registry::RpcMethod;
use bleconfd::rpc::server::RpcServer;
use bleconfd::rpc::service::{Notifier, RpcService};
use bleconfd::rpc::transport::{ConnectedClient, DataHandler};
use serde_json::{Value, json};

// ── RecordingClient ───────────────────────────────────────────

#[derive(Default)]
pub struct RecordingClient {
    sent: Mutex<Vec<Value>>,
    /// Held across the whole write to model an atomic transport send.
    write_delay: Option<Duration>,
    reject: AtomicBool,
}

#[allow(dead_code)]
impl RecordingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_write_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            write_delay: Some(delay),
            ..Self::default()
        })
    }

    /// Make every subsequent send fail.
    pub fn reject_sends(&self) {
        self.reject.store(true, Ordering::Release);
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until at least `n` documents arrived (or 3 s passed).
    pub fn wait_for(&self, n: usize) -> Vec<Value> {
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            let sent = self.sent();
            if sent.len() >= n || Instant::now() > deadline {
                return sent;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    pub fn responses(&self) -> Vec<Value> {
        self.sent().into_iter().filter(|d| d.get("id").is_some()).collect()
    }

    pub fn notifications(&self, method: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|d| d.get("id").is_none() && d["method"] == json!(method))
            .collect()
    }
}

impl ConnectedClient for RecordingClient {
    fn set_data_handler(&self, _handler: DataHandler) {}

    fn enqueue_for_send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.reject.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }
        let doc: Value = serde_json::from_slice(data).expect("server sent malformed JSON");
        let mut sent = self.sent.lock().unwrap();
        if let Some(delay) = self.write_delay {
            thread::sleep(delay);
        }
        sent.push(doc);
        Ok(())
    }

    fn run(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&self) {}

    fn peer(&self) -> String {
        "recording".into()
    }
}

// ── Test services ─────────────────────────────────────────────

/// `echo` returns its params; `sleep` waits `params.ms` then returns
/// `params.tag`; `fail` returns an application error; `panic` panics.
pub struct ToolService;

impl RpcService for ToolService {
    fn init(&mut self, _config: &DaemonConfig, _notifier: Notifier) -> Result<(), ServiceError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "tools"
    }

    fn method_names(&self) -> Vec<String> {
        ["echo", "sleep", "fail", "panic"].iter().map(|s| (*s).to_owned()).collect()
    }

    fn method(&self, name: &str) -> Option<RpcMethod> {
        let m: RpcMethod = match name {
            "echo" => Arc::new(|p: &Value| Ok(p.clone())),
            "sleep" => Arc::new(|p: &Value| {
                let ms = p["ms"].as_u64().unwrap_or(0);
                thread::sleep(Duration::from_millis(ms));
                Ok(p["tag"].clone())
            }),
            "fail" => Arc::new(|_: &Value| Err(RpcError::application(7, "nope"))),
            "panic" => Arc::new(|_: &Value| -> Result<Value, RpcError> { panic!("handler exploded") }),
            _ => return None,
        };
        Some(m)
    }
}

/// A service whose one method blocks until released by the test.
pub struct GateService {
    gate: Arc<Mutex<Receiver<()>>>,
    entered: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl GateService {
    /// Returns the service, a release function and an "entered" flag.
    pub fn new() -> (Self, impl Fn(), Arc<AtomicBool>) {
        let (tx, rx) = channel();
        let entered = Arc::new(AtomicBool::new(false));
        let svc = Self {
            gate: Arc::new(Mutex::new(rx)),
            entered: Arc::clone(&entered),
        };
        (svc, move || { let _ = tx.send(()); }, entered)
    }
}

impl RpcService for GateService {
    fn init(&mut self, _config: &DaemonConfig, _notifier: Notifier) -> Result<(), ServiceError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "gate"
    }

    fn method_names(&self) -> Vec<String> {
        vec!["gate-wait".into()]
    }

    fn method(&self, name: &str) -> Option<RpcMethod> {
        if name != "gate-wait" {
            return None;
        }
        let gate = Arc::clone(&self.gate);
        let entered = Arc::clone(&self.entered);
        Some(Arc::new(move |_: &Value| {
            entered.store(true, Ordering::Release);
            let _ = gate.lock().unwrap().recv_timeout(Duration::from_secs(5));
            Ok(json!("released"))
        }))
    }
}

/// A service that keeps its notifier for the test to drive.
pub struct NotifyingService {
    name: &'static str,
    slot: Arc<Mutex<Option<Notifier>>>,
}

#[allow(dead_code)]
impl NotifyingService {
    pub fn new(name: &'static str) -> (Self, Arc<Mutex<Option<Notifier>>>) {
        let slot = Arc::new(Mutex::new(None));
        (Self { name, slot: Arc::clone(&slot) }, slot)
    }
}

impl RpcService for NotifyingService {
    fn init(&mut self, _config: &DaemonConfig, notifier: Notifier) -> Result<(), ServiceError> {
        *self.slot.lock().unwrap() = Some(notifier);
        Ok(())
    }

    fn name(&self) -> &str {
        self.name
    }

    fn method_names(&self) -> Vec<String> {
        vec![format!("{}-ping", self.name)]
    }

    fn method(&self, name: &str) -> Option<RpcMethod> {
        (name == format!("{}-ping", self.name)).then(|| Arc::new(|_: &Value| Ok(json!("pong"))) as RpcMethod)
    }
}

// ── Harness ───────────────────────────────────────────────────

/// Server with `services` registered and a recording client attached.
#[allow(dead_code)]
pub fn server_with(services: Vec<Box<dyn RpcService>>) -> (Arc<RpcServer>, Arc<RecordingClient>) {
    server_with_client(services, RecordingClient::new())
}

#[allow(dead_code)]
pub fn server_with_client(
    services: Vec<Box<dyn RpcService>>,
    client: Arc<RecordingClient>,
) -> (Arc<RpcServer>, Arc<RecordingClient>) {
    let mut server = RpcServer::new(Arc::new(DaemonConfig::default()));
    for svc in services {
        server.register_service(svc).unwrap();
    }
    let server = Arc::new(server);
    server.set_client(Arc::clone(&client) as Arc<dyn ConnectedClient>);
    (server, client)
}
