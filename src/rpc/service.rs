//! Service plugin boundary and the per-service notification channel.
//!
//! A service is registered once, before the dispatch loop starts:
//!
//! 1. `init` receives the daemon config and a [`Notifier`]
//! 2. `method_names` is enumerated
//! 3. `method(name)` supplies each handler for the registry
//!
//! Only the notifier outlives the registration phase. It may be cloned
//! into worker threads and used at any time, connected peer or not.

use std::sync::Arc;

use log::debug;
use serde_json::Value;

use super::message::Notification;
use super::outbound::Outbound;
use super::registry::RpcMethod;
use crate::config::DaemonConfig;
use crate::error::ServiceError;

/// A pluggable unit exposing named RPC methods.
pub trait RpcService: Send + Sync {
    /// Called exactly once, before any method is looked up.
    fn init(&mut self, config: &DaemonConfig, notifier: Notifier) -> Result<(), ServiceError>;

    /// Owning identity used in the registry and in logs.
    fn name(&self) -> &str;

    /// Every method this service exposes.
    fn method_names(&self) -> Vec<String>;

    /// Handler for one of [`method_names`](Self::method_names).
    fn method(&self, name: &str) -> Option<RpcMethod>;
}

/// Server-initiated push channel handed to a service at `init`.
///
/// Sends are fire-and-forget: no acknowledgement, no retry.
#[derive(Clone)]
pub struct Notifier {
    service: Arc<str>,
    outbound: Arc<Outbound>,
}

impl Notifier {
    pub(crate) fn new(service: &str, outbound: Arc<Outbound>) -> Self {
        Self {
            service: Arc::from(service),
            outbound,
        }
    }

    /// Push `method` with `params` to the connected peer, if any.
    /// Returns whether a client accepted the document.
    pub fn notify(&self, method: &str, params: Value) -> bool {
        self.send(&Notification::new(method, params))
    }

    pub fn send(&self, notification: &Notification) -> bool {
        debug!("RPC[{}]: notify '{}'", self.service, notification.method);
        self.outbound.send_notification(notification)
    }

    /// Publish a status code to the peer's polled status attribute.
    /// Survives reconnects: a later client starts from the last code.
    pub fn publish_state(&self, code: u16) {
        self.outbound.publish_state(code);
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}
