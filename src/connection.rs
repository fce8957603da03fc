//! Connection manager: one peer at a time.
//!
//! ```text
//!        ┌──────┐  init   ┌───────────┐ accept ┌───────────┐
//!        │ Idle │────────▶│ Listening │───────▶│ Connected │
//!        └──────┘         └───────────┘        └─────┬─────┘
//!            ▲                  ▲ ▲                  │ peer gone / shutdown
//!   shutdown │                  │ └───────────┐      ▼
//!            └──────────────────┘             └─┬─────────┐
//!                                               │ Closing │
//!                                               └─────────┘
//! ```
//!
//! On Connected the manager binds the client to the [`RpcServer`], starts
//! the dispatch thread, only then installs the data handler, and blocks in
//! `client.run()`. On Closing it stops
//! the server (discarding anything still queued), joins the dispatch
//! thread and detaches the client before listening again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::error::TransportError;
use crate::rpc::server::RpcServer;
use crate::rpc::transport::{ConnectedClient, Listener};

/// How often a connected session re-checks the shutdown flag.
const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Listening,
    Connected,
    Closing,
}

pub struct ConnectionManager {
    listener: Box<dyn Listener>,
    server: Arc<RpcServer>,
    shutdown: Arc<AtomicBool>,
    state: ConnState,
    watch_interval: Duration,
    sessions: u64,
}

impl ConnectionManager {
    pub fn new(listener: Box<dyn Listener>, server: Arc<RpcServer>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            listener,
            server,
            shutdown,
            state: ConnState::Idle,
            watch_interval: DEFAULT_WATCH_INTERVAL,
            sessions: 0,
        }
    }

    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Peers served to completion so far.
    pub fn sessions(&self) -> u64 {
        self.sessions
    }

    fn transition(&mut self, to: ConnState) {
        if self.state != to {
            info!("Conn: {:?} -> {:?}", self.state, to);
            self.state = to;
        }
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Serve peers until the shutdown flag is raised.
    pub fn run(&mut self) -> Result<(), TransportError> {
        while !self.shutting_down() {
            self.transition(ConnState::Listening);
            if let Err(e) = self.listener.init() {
                self.transition(ConnState::Idle);
                return Err(e);
            }

            let client = match self.listener.accept(&self.shutdown) {
                Ok(Some(client)) => client,
                Ok(None) => break,
                Err(e) => {
                    self.transition(ConnState::Idle);
                    return Err(e);
                }
            };

            self.serve(client)?;
        }

        self.transition(ConnState::Idle);
        info!("Conn: shut down after {} session(s)", self.sessions);
        Ok(())
    }

    fn serve(&mut self, client: Arc<dyn ConnectedClient>) -> Result<(), TransportError> {
        self.transition(ConnState::Connected);
        info!("Conn: serving {}", client.peer());

        // The queue must be re-armed before the peer can deliver anything.
        self.server.set_client(Arc::clone(&client));
        let dispatch = self.server.spawn()?;
        let server = Arc::clone(&self.server);
        client.set_data_handler(Arc::new(move |bytes: &[u8]| server.on_incoming_message(bytes)));

        let session_over = Arc::new(AtomicBool::new(false));
        let watcher = {
            let client = Arc::clone(&client);
            let shutdown = Arc::clone(&self.shutdown);
            let over = Arc::clone(&session_over);
            let interval = self.watch_interval;
            thread::Builder::new()
                .name("conn-watch".into())
                .spawn(move || {
                    while !over.load(Ordering::Acquire) {
                        if shutdown.load(Ordering::Acquire) {
                            client.close();
                            return;
                        }
                        thread::sleep(interval);
                    }
                })?
        };

        if let Err(e) = client.run() {
            warn!("Conn: {} ended with error: {}", client.peer(), e);
        }
        session_over.store(true, Ordering::Release);

        self.transition(ConnState::Closing);
        client.close();
        self.server.stop();
        dispatch.join();
        self.server.clear_client();
        client.set_data_handler(Arc::new(|_: &[u8]| {}));
        if watcher.join().is_err() {
            warn!("Conn: watcher thread panicked");
        }

        self.sessions += 1;
        Ok(())
    }
}
