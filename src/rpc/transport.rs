//! Transport abstraction: the live connection as seen by the dispatcher.
//!
//! Concrete implementations:
//! - TCP stream with length-prefix framing ([`StreamClient`](crate::adapters::stream_client::StreamClient))
//! - BLE GATT characteristic write + notify ([`GattClient`](crate::adapters::gatt::GattClient))
//!
//! The RPC server only ever talks to `dyn ConnectedClient`, so adding a
//! new transport requires zero changes to the RPC logic.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::error::TransportError;

/// Callback the transport invokes with each complete inbound document.
pub type DataHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// One connected remote peer.
///
/// `enqueue_for_send` may be called concurrently from the dispatch thread
/// and from service workers; implementations must write each call as one
/// complete, non-interleaved unit.
pub trait ConnectedClient: Send + Sync {
    /// Install the inbound callback. Replaces any previous handler.
    fn set_data_handler(&self, handler: DataHandler);

    /// Transmit one complete document.
    fn enqueue_for_send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Pump inbound data until the peer disconnects or [`close`](Self::close) is called.
    fn run(&self) -> Result<(), TransportError>;

    /// Ask a running [`run`](Self::run) to return.
    fn close(&self);

    /// Human-readable peer description for logs.
    fn peer(&self) -> String;

    /// Mirror a service status code into a peer-readable attribute, for
    /// transports that expose one (the GATT provision-state characteristic).
    fn publish_state(&self, _code: u16) {}
}

/// Source of connected clients.
pub trait Listener: Send {
    /// Bind / power up. Called on every Idle → Listening transition.
    fn init(&mut self) -> Result<(), TransportError>;

    /// Wait for the next peer. Returns `Ok(None)` once `shutdown` is set.
    fn accept(
        &mut self,
        shutdown: &AtomicBool,
    ) -> Result<Option<Arc<dyn ConnectedClient>>, TransportError>;
}

/// A client that discards all writes and never delivers data.
/// Useful as a placeholder when no peer is connected.
pub struct NullClient;

impl ConnectedClient for NullClient {
    fn set_data_handler(&self, _handler: DataHandler) {}

    fn enqueue_for_send(&self, _data: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }

    fn run(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&self) {}

    fn peer(&self) -> String {
        "null".into()
    }
}
