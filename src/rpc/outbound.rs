//! Outbound path shared by the dispatch loop and service notifiers.
//!
//! Holds the currently attached client, if any. Sends never fail loudly:
//! with no client attached, or when the transport rejects the write, the
//! document is dropped and counted. Serializing concurrent writes is the
//! client's contract, not ours.
//!
//! A response the transport refuses as too large is replaced by a short
//! Internal-Error carrying the same id, so the peer is never left waiting.
//!
//! The last published status code is kept and replayed to each newly
//! attached client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};

use super::message::{Notification, Response, RpcError};
use super::transport::ConnectedClient;
use super::wire::{encode_notification, encode_response};
use crate::error::TransportError;

#[derive(Default)]
pub struct Outbound {
    client: Mutex<Option<Arc<dyn ConnectedClient>>>,
    state: Mutex<Option<u16>>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl Outbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, client: Arc<dyn ConnectedClient>) {
        if let Some(code) = *self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            client.publish_state(code);
        }
        *self.client.lock().unwrap_or_else(PoisonError::into_inner) = Some(client);
    }

    pub fn detach(&self) {
        *self.client.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_attached(&self) -> bool {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn current(&self) -> Option<Arc<dyn ConnectedClient>> {
        // Clone out of the lock so a slow write never blocks attach/detach.
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn deliver(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let Some(client) = self.current() else {
            debug!("RPC: no client attached, dropping {} byte document", bytes.len());
            return Err(TransportError::NotConnected);
        };
        client.enqueue_for_send(bytes).inspect_err(|e| {
            warn!("RPC: send to {} failed: {}", client.peer(), e);
        })
    }

    fn record(&self, outcome: &Result<(), TransportError>) -> bool {
        match outcome {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Hand one encoded document to the attached client.
    pub fn send_document(&self, bytes: &[u8]) -> bool {
        self.record(&self.deliver(bytes))
    }

    pub fn send_response(&self, response: &Response) -> bool {
        let bytes = match encode_response(response) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("RPC: failed to encode response: {}", e);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        match self.deliver(&bytes) {
            Err(TransportError::FrameTooLarge { len, max }) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("RPC: response to id {} too large ({} > {}), answering Internal-Error", response.id, len, max);
                let fallback = Response::error(
                    Some(response.id.clone()),
                    RpcError::internal(format!("response of {len} bytes exceeds the {max} byte frame limit")),
                );
                match encode_response(&fallback) {
                    Ok(bytes) => self.send_document(&bytes),
                    Err(_) => false,
                }
            }
            outcome => self.record(&outcome),
        }
    }

    pub fn send_notification(&self, notification: &Notification) -> bool {
        match encode_notification(notification) {
            Ok(bytes) => self.send_document(&bytes),
            Err(e) => {
                warn!("RPC: failed to encode notification '{}': {}", notification.method, e);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Record `code` and push it to the attached client's status attribute.
    pub fn publish_state(&self, code: u16) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(code);
        if let Some(client) = self.current() {
            client.publish_state(code);
        }
    }

    /// Last code passed to [`publish_state`](Self::publish_state).
    pub fn last_state(&self) -> Option<u16> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Documents accepted by a client.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Documents dropped (no client, encode or transport failure).
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
