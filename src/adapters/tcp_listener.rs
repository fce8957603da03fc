//! TCP listener producing [`StreamClient`] peers.
//!
//! The socket is non-blocking: `accept` polls every `accept_poll_ms` and
//! re-checks the shutdown flag between polls, so a signal never waits on
//! a peer that will not come.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{info, warn};

use super::stream_client::StreamClient;
use crate::config::DaemonConfig;
use crate::error::TransportError;
use crate::rpc::transport::{ConnectedClient, Listener};

pub struct TcpRpcListener {
    addr: String,
    poll: Duration,
    max_frame_size: usize,
    listener: Option<TcpListener>,
}

impl TcpRpcListener {
    pub fn new(addr: impl Into<String>, poll: Duration, max_frame_size: usize) -> Self {
        Self {
            addr: addr.into(),
            poll,
            max_frame_size,
            listener: None,
        }
    }

    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(
            config.transport.listen_addr.clone(),
            Duration::from_millis(config.transport.accept_poll_ms),
            config.rpc.max_frame_size,
        )
    }

    /// Bound address, once [`init`](Listener::init) has run.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }
}

impl Listener for TcpRpcListener {
    fn init(&mut self) -> Result<(), TransportError> {
        if self.listener.is_some() {
            return Ok(());
        }
        let listener = TcpListener::bind(&self.addr)?;
        listener.set_nonblocking(true)?;
        info!("Conn: listening on tcp://{}", listener.local_addr()?);
        self.listener = Some(listener);
        Ok(())
    }

    fn accept(
        &mut self,
        shutdown: &AtomicBool,
    ) -> Result<Option<Arc<dyn ConnectedClient>>, TransportError> {
        let listener = self.listener.as_ref().ok_or(TransportError::NotConnected)?;

        while !shutdown.load(Ordering::Acquire) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(false)?;
                    match StreamClient::new(stream, self.max_frame_size) {
                        Ok(client) => {
                            info!("Conn: peer connected from {}", addr);
                            return Ok(Some(Arc::new(client)));
                        }
                        Err(e) => warn!("Conn: rejecting {}: {}", addr, e),
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(self.poll),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}
