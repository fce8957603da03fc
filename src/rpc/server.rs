//! RPC server: the dispatch engine.
//!
//! **Transport-decoupled**: the server never owns a socket. The connection
//! manager attaches a [`ConnectedClient`] with [`RpcServer::set_client`]
//! and wires the client's data handler to [`RpcServer::on_incoming_message`].
//!
//! ```text
//!  transport thread          dispatch thread               service workers
//!  ────────────────          ───────────────               ───────────────
//!  on_incoming_message ─▶ InboundQueue ─▶ process ─┐
//!                                                   ├─▶ Outbound ─▶ client
//!                               Notifier::notify ───┘
//! ```
//!
//! Every entry goes through the same pipeline:
//!
//! 1. **Decode failure**: answered with the salvaged id (or `null`).
//! 2. **Lookup**: unknown methods get Method-Not-Found, but only when the
//!    peer sent an id; unknown peer notifications are just logged.
//! 3. **Invoke**: on the dispatch thread, with panics caught and turned
//!    into Internal-Error.
//! 4. **Reply**: exactly one response per identified request, none for
//!    peer notifications.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use serde_json::Value;

use super::message::{Notification, Response, RpcError};
use super::outbound::Outbound;
use super::queue::{Inbound, InboundQueue};
use super::registry::{MethodRegistry, RpcMethod};
use super::service::{Notifier, RpcService};
use super::transport::ConnectedClient;
use super::wire::{self, DecodeError};
use crate::config::DaemonConfig;
use crate::error::{RegistryError, Result};

/// Snapshot of dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Queue entries processed by the loop.
    pub dispatched: u64,
    /// Handler panics converted into Internal-Error.
    pub handler_faults: u64,
    /// Documents handed to a client (responses + notifications).
    pub sent: u64,
    /// Documents dropped on the outbound path.
    pub dropped: u64,
    /// Queue entries discarded by `stop`.
    pub discarded: u64,
}

pub struct RpcServer {
    config: Arc<DaemonConfig>,
    registry: MethodRegistry,
    services: Vec<Box<dyn RpcService>>,
    queue: InboundQueue,
    outbound: Arc<Outbound>,
    running: AtomicBool,
    dispatched: AtomicU64,
    handler_faults: AtomicU64,
    discarded: AtomicU64,
}

impl RpcServer {
    pub fn new(config: Arc<DaemonConfig>) -> Self {
        Self {
            config,
            registry: MethodRegistry::new(),
            services: Vec::new(),
            queue: InboundQueue::new(),
            outbound: Arc::new(Outbound::new()),
            running: AtomicBool::new(false),
            dispatched: AtomicU64::new(0),
            handler_faults: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    // ── Registration phase ────────────────────────────────────

    /// Initialise `service` and register all of its methods.
    ///
    /// Fails without registering anything if a method name is already
    /// owned by another service.
    pub fn register_service(&mut self, mut service: Box<dyn RpcService>) -> Result<()> {
        let name = service.name().to_owned();
        service.init(&self.config, self.notifier(&name))?;

        let mut methods: Vec<(String, RpcMethod)> = Vec::new();
        for method in service.method_names() {
            let handler = service
                .method(&method)
                .ok_or_else(|| RegistryError::MissingHandler {
                    service: name.clone(),
                    method: method.clone(),
                })?;
            methods.push((method, handler));
        }

        let names: Vec<String> = methods.iter().map(|(m, _)| m.clone()).collect();
        self.registry.register_all(&name, methods)?;
        for method in &names {
            info!("RPC: registered '{}' from service '{}'", method, name);
        }

        self.services.push(service);
        Ok(())
    }

    /// A notification channel bound to this server's outbound path.
    pub fn notifier(&self, service: &str) -> Notifier {
        Notifier::new(service, Arc::clone(&self.outbound))
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Names of registered services, in registration order.
    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    // ── Connection binding ────────────────────────────────────

    /// Attach the peer for a new connection and re-arm the queue.
    pub fn set_client(&self, client: Arc<dyn ConnectedClient>) {
        info!("RPC: attaching client {}", client.peer());
        self.queue.restart();
        self.outbound.attach(client);
    }

    /// Detach the current peer; later sends are dropped.
    pub fn clear_client(&self) {
        self.outbound.detach();
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Transport callback: decode one complete document and queue it.
    ///
    /// Safe from any thread; never waits on handler execution.
    pub fn on_incoming_message(&self, bytes: &[u8]) {
        let entry = wire::decode(bytes);
        if let Err(e) = &entry {
            debug!("RPC: undecodable document ({} bytes): {}", bytes.len(), e.error.message);
        }
        if !self.queue.push(entry) {
            debug!("RPC: server stopped, dropping inbound document");
        }
    }

    // ── Dispatch loop ─────────────────────────────────────────

    /// Run the dispatch loop on the calling thread until [`stop`](Self::stop).
    ///
    /// Only one loop may run at a time; a second concurrent call returns
    /// immediately.
    pub fn run(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("RPC: dispatch loop already running");
            return;
        }
        info!("RPC: dispatch loop started");

        while let Some(entry) = self.queue.pop() {
            self.process(entry);
        }

        self.running.store(false, Ordering::Release);
        info!("RPC: dispatch loop stopped");
    }

    /// Run the dispatch loop on a dedicated `rpc-dispatch` thread.
    pub fn spawn(self: &Arc<Self>) -> io::Result<DispatchHandle> {
        let server = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("rpc-dispatch".into())
            .spawn(move || server.run())?;
        Ok(DispatchHandle { handle })
    }

    /// Terminate the loop; queued entries are discarded unprocessed.
    pub fn stop(&self) {
        let discarded = self.queue.stop();
        self.discarded.fetch_add(discarded as u64, Ordering::Relaxed);
        if discarded > 0 {
            warn!("RPC: stop discarded {} queued entries", discarded);
        }
        info!("RPC: stop requested");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // ── Server-initiated messages ─────────────────────────────

    /// Encode and send a notification immediately, bypassing the queue.
    pub fn enqueue_async_message(&self, notification: &Notification) -> bool {
        self.outbound.send_notification(notification)
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            handler_faults: self.handler_faults.load(Ordering::Relaxed),
            sent: self.outbound.sent_count(),
            dropped: self.outbound.dropped_count(),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn process(&self, entry: Inbound) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        let request = match entry {
            Ok(request) => request,
            Err(DecodeError { id, error }) => {
                warn!("RPC: rejecting document: {} ({})", error.message, error.code);
                self.outbound.send_response(&Response::error(id, error));
                return;
            }
        };

        let Some(entry) = self.registry.lookup(&request.method) else {
            match request.id {
                Some(id) => {
                    warn!("RPC: method not found: '{}'", request.method);
                    self.outbound
                        .send_response(&Response::error(Some(id), RpcError::method_not_found(&request.method)));
                }
                None => warn!("RPC: notification for unknown method '{}' ignored", request.method),
            }
            return;
        };

        debug!("RPC: dispatch '{}' -> {}", request.method, entry.service);
        let outcome = self.invoke(&entry.handler, &request.method, &request.params);

        match (request.id, outcome) {
            (Some(id), Ok(result)) => {
                self.outbound.send_response(&Response::result(id, result));
            }
            (Some(id), Err(error)) => {
                self.outbound.send_response(&Response::error(Some(id), error));
            }
            (None, Err(error)) => {
                debug!("RPC: notification '{}' failed: {}", request.method, error.message);
            }
            (None, Ok(_)) => {}
        }
    }

    fn invoke(&self, handler: &RpcMethod, method: &str, params: &Value) -> core::result::Result<Value, RpcError> {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                self.handler_faults.fetch_add(1, Ordering::Relaxed);
                let reason = panic_message(payload.as_ref());
                error!("RPC: handler '{}' panicked: {}", method, reason);
                Err(RpcError::internal(format!("handler '{method}' failed: {reason}")))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Join handle for a loop started with [`RpcServer::spawn`].
pub struct DispatchHandle {
    handle: JoinHandle<()>,
}

impl DispatchHandle {
    /// Wait for the loop to exit. Call after [`RpcServer::stop`].
    pub fn join(self) {
        if self.handle.join().is_err() {
            error!("RPC: dispatch thread panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
