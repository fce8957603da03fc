//! BLE GATT transport: JSON-RPC over characteristic write/notify.
//!
//! The central writes documents to the Inbox characteristic and receives
//! responses and notifications as GATT notifications on the same
//! characteristic.
//!
//! ## MTU fragmentation
//!
//! Documents larger than one ATT payload are split into fragments with a
//! two-byte header:
//!
//! ```text
//! ┌──────┬──────┬─────────────────────┐
//! │ Seq  │ Flags│  Fragment payload   │
//! │ (1B) │ (1B) │  (mtu - 5 bytes)    │
//! └──────┴──────┴─────────────────────┘
//! ```
//!
//! Flags: bit 0 = "more fragments", bit 1 = "first fragment"
//!
//! ## GATT Service Layout
//!
//! | Characteristic     | UUID                                   | Perms        |
//! |--------------------|----------------------------------------|--------------|
//! | (service)          | `8df5ad72-9bbc-4167-bcd9-e8eb9e4d671b` |              |
//! | WiFi config        | `b87a896b-4052-4cab-a7e7-a71594d9c353` | Write        |
//! | Public key         | `cb9fee4d-c6ed-48c1-ab46-c3f2da38eedd` | Read         |
//! | Provision state    | `79defbc1-eb45-448d-9f2a-1ecc3a47a242` | Read/Notify  |
//! | Inbox (RPC)        | `cb163929-9a3d-4a1e-826f-e7e7cb2039e8` | Write/Notify |
//! | Device id          | `12984c43-3b43-4952-a387-715dcf9795c6` | Read         |
//! | Lost-and-found     | `16abb396-ab2c-4928-973d-e28a406d042b` | Read         |

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::error::TransportError;
use crate::rpc::transport::{ConnectedClient, DataHandler, Listener};
use crate::services::status::ProvisionStatus;

// ── Constants ────────────────────────────────────────────────

pub const SERVICE_PROVISION: u128 = 0x8df5ad72_9bbc_4167_bcd9_e8eb9e4d671b;
pub const CHAR_WIFI_CONFIG: u128 = 0xb87a896b_4052_4cab_a7e7_a71594d9c353;
pub const CHAR_PUBLIC_KEY: u128 = 0xcb9fee4d_c6ed_48c1_ab46_c3f2da38eedd;
pub const CHAR_PROVISION_STATE: u128 = 0x79defbc1_eb45_448d_9f2a_1ecc3a47a242;
pub const CHAR_INBOX: u128 = 0xcb163929_9a3d_4a1e_826f_e7e7cb2039e8;
pub const CHAR_DEVICE_ID: u128 = 0x12984c43_3b43_4952_a387_715dcf9795c6;
pub const CHAR_LOST_AND_FOUND: u128 = 0x16abb396_ab2c_4928_973d_e28a406d042b;

/// Characteristics of [`SERVICE_PROVISION`], in advertised order.
pub const CHARACTERISTICS: [(u128, &str); 6] = [
    (CHAR_WIFI_CONFIG, "wifi-config"),
    (CHAR_PUBLIC_KEY, "public-key"),
    (CHAR_PROVISION_STATE, "provision-state"),
    (CHAR_INBOX, "inbox"),
    (CHAR_DEVICE_ID, "device-id"),
    (CHAR_LOST_AND_FOUND, "lost-and-found"),
];

const ATT_OVERHEAD: usize = 3;
pub const FRAG_HEADER_SIZE: usize = 2;

/// Fragment flag: more fragments follow.
pub const FRAG_MORE: u8 = 0x01;
/// Fragment flag: this is the first fragment.
pub const FRAG_FIRST: u8 = 0x02;

// ── Fragmentation ────────────────────────────────────────────

/// Split `data` into notification-sized fragments for `mtu`.
pub fn fragment(data: &[u8], mtu: usize) -> Result<Vec<Vec<u8>>, TransportError> {
    let max_payload = mtu.saturating_sub(ATT_OVERHEAD + FRAG_HEADER_SIZE);
    if max_payload == 0 {
        return Err(TransportError::MtuTooSmall(mtu));
    }

    let chunks: Vec<&[u8]> = if data.is_empty() {
        vec![data]
    } else {
        data.chunks(max_payload).collect()
    };
    let total = chunks.len();

    let mut seq = 0u8;
    let mut out = Vec::with_capacity(total);
    for (i, chunk) in chunks.iter().enumerate() {
        let mut flags = 0u8;
        if i == 0 {
            flags |= FRAG_FIRST;
        }
        if i < total - 1 {
            flags |= FRAG_MORE;
        }
        let mut frag = Vec::with_capacity(FRAG_HEADER_SIZE + chunk.len());
        frag.push(seq);
        frag.push(flags);
        frag.extend_from_slice(chunk);
        out.push(frag);
        seq = seq.wrapping_add(1);
    }
    Ok(out)
}

/// Per-peer reassembly buffer for fragmented documents.
pub struct Reassembler {
    data: Vec<u8>,
    max_len: usize,
    expected_seq: u8,
    active: bool,
}

impl Reassembler {
    pub fn new(max_len: usize) -> Self {
        Self {
            data: Vec::new(),
            max_len,
            expected_seq: 0,
            active: false,
        }
    }

    pub fn reset(&mut self) {
        self.data.clear();
        self.expected_seq = 0;
        self.active = false;
    }

    /// Feed one raw fragment (header included). Returns the complete
    /// document when the last fragment arrives.
    pub fn push(&mut self, fragment: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        if fragment.len() < FRAG_HEADER_SIZE {
            return Err(TransportError::MalformedFragment(fragment.len()));
        }
        let seq = fragment[0];
        let flags = fragment[1];
        let payload = &fragment[FRAG_HEADER_SIZE..];

        if flags & FRAG_FIRST != 0 {
            self.reset();
            self.active = true;
        }

        if !self.active {
            return Err(TransportError::SequenceError {
                expected: self.expected_seq,
                got: seq,
            });
        }

        if seq != self.expected_seq {
            let expected = self.expected_seq;
            self.reset();
            return Err(TransportError::SequenceError { expected, got: seq });
        }

        if self.data.len() + payload.len() > self.max_len {
            self.reset();
            return Err(TransportError::ReassemblyOverflow);
        }

        self.data.extend_from_slice(payload);
        self.expected_seq = seq.wrapping_add(1);

        if flags & FRAG_MORE != 0 {
            Ok(None)
        } else {
            self.active = false;
            self.expected_seq = 0;
            Ok(Some(core::mem::take(&mut self.data)))
        }
    }
}

// ── GATT client ──────────────────────────────────────────────

/// Platform callback that pushes one GATT notification to the central.
pub type NotifyFn = Box<dyn FnMut(&[u8]) -> Result<(), TransportError> + Send>;

/// One connected central.
pub struct GattClient {
    peer: String,
    mtu: usize,
    max_frame_size: usize,
    reassembly: Mutex<Reassembler>,
    notify: Mutex<NotifyFn>,
    handler: Mutex<Option<DataHandler>>,
    closed: Mutex<bool>,
    closed_cv: Condvar,
    provision_state: AtomicU16,
}

impl GattClient {
    pub fn new(peer: impl Into<String>, mtu: usize, max_frame_size: usize, notify: NotifyFn) -> Self {
        Self {
            peer: peer.into(),
            mtu,
            max_frame_size,
            reassembly: Mutex::new(Reassembler::new(max_frame_size)),
            notify: Mutex::new(notify),
            handler: Mutex::new(None),
            closed: Mutex::new(false),
            closed_cv: Condvar::new(),
            provision_state: AtomicU16::new(ProvisionStatus::AwaitingConfiguration.code()),
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True once a data handler is attached.
    pub fn is_attached(&self) -> bool {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Platform callback for a write to the Inbox characteristic.
    pub fn on_gatt_write(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::NotConnected);
        }
        let complete = self
            .reassembly
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data);

        match complete {
            Ok(Some(document)) => {
                let handler = self
                    .handler
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                match handler {
                    Some(h) => h(&document),
                    None => debug!("Conn: no data handler, dropping {} byte document", document.len()),
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                warn!("Conn: {} bad fragment: {}", self.peer, e);
                Err(e)
            }
        }
    }

    /// Provision-state characteristic bytes (little-endian u16).
    pub fn read_provision_state(&self) -> [u8; 2] {
        self.provision_state.load(Ordering::Acquire).to_le_bytes()
    }

    /// Platform callback for a read of one of [`CHARACTERISTICS`].
    /// `None` for characteristics without a readable value on this peer.
    pub fn read_characteristic(&self, uuid: u128) -> Option<Vec<u8>> {
        match uuid {
            CHAR_PROVISION_STATE => Some(self.read_provision_state().to_vec()),
            _ => None,
        }
    }
}

impl ConnectedClient for GattClient {
    fn set_data_handler(&self, handler: DataHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    fn enqueue_for_send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::NotConnected);
        }
        if data.len() > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                len: data.len(),
                max: self.max_frame_size,
            });
        }
        let fragments = fragment(data, self.mtu)?;
        // One lock for the whole document so fragments never interleave.
        let mut notify = self.notify.lock().unwrap_or_else(PoisonError::into_inner);
        for frag in &fragments {
            notify(frag)?;
        }
        Ok(())
    }

    fn run(&self) -> Result<(), TransportError> {
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        while !*closed {
            closed = self
                .closed_cv
                .wait(closed)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    fn close(&self) {
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if !*closed {
            info!("Conn: {} disconnected", self.peer);
        }
        *closed = true;
        drop(closed);
        self.closed_cv.notify_all();
    }

    fn peer(&self) -> String {
        format!("gatt://{} (MTU={})", self.peer, self.mtu)
    }

    fn publish_state(&self, code: u16) {
        let previous = self.provision_state.swap(code, Ordering::AcqRel);
        if previous != code {
            debug!("Conn: {} provision state {:#06x} -> {:#06x}", self.peer, previous, code);
        }
    }
}

// ── Simulated peripheral ─────────────────────────────────────

/// Listener for hosts without a Bluetooth stack: peers are created by a
/// paired [`SimCentral`].
pub struct SimGattListener {
    incoming: Receiver<Arc<GattClient>>,
    poll: Duration,
}

/// The "phone" side of a [`SimGattListener`].
#[derive(Clone)]
pub struct SimCentral {
    outgoing: Sender<Arc<GattClient>>,
    mtu: usize,
    max_frame_size: usize,
    next_peer: Arc<AtomicU16>,
}

impl SimGattListener {
    pub fn new(mtu: usize, max_frame_size: usize, poll: Duration) -> (Self, SimCentral) {
        let (outgoing, incoming) = mpsc::channel();
        let central = SimCentral {
            outgoing,
            mtu,
            max_frame_size,
            next_peer: Arc::new(AtomicU16::new(0)),
        };
        (Self { incoming, poll }, central)
    }

    pub fn from_config(config: &DaemonConfig) -> (Self, SimCentral) {
        Self::new(
            config.transport.gatt_mtu,
            config.rpc.max_frame_size,
            Duration::from_millis(config.transport.accept_poll_ms),
        )
    }
}

impl Listener for SimGattListener {
    fn init(&mut self) -> Result<(), TransportError> {
        info!("Conn: advertising simulated GATT service {:032x}", SERVICE_PROVISION);
        for (uuid, name) in CHARACTERISTICS {
            debug!("Conn:   {:<16} {:032x}", name, uuid);
        }
        Ok(())
    }

    fn accept(
        &mut self,
        shutdown: &AtomicBool,
    ) -> Result<Option<Arc<dyn ConnectedClient>>, TransportError> {
        while !shutdown.load(Ordering::Acquire) {
            match self.incoming.recv_timeout(self.poll) {
                Ok(client) => return Ok(Some(client)),
                Err(RecvTimeoutError::Timeout) => {}
                // Every central is gone; nothing will ever connect, but
                // keep honouring the shutdown flag.
                Err(RecvTimeoutError::Disconnected) => thread::sleep(self.poll),
            }
        }
        Ok(None)
    }
}

impl SimCentral {
    /// Connect a new simulated central.
    pub fn connect(&self) -> Result<SimLink, TransportError> {
        let n = self.next_peer.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let notify: NotifyFn = Box::new(move |frag: &[u8]| {
            tx.send(frag.to_vec()).map_err(|_| TransportError::NotConnected)
        });
        let client = Arc::new(GattClient::new(
            format!("sim-central-{n}"),
            self.mtu,
            self.max_frame_size,
            notify,
        ));
        self.outgoing
            .send(Arc::clone(&client))
            .map_err(|_| TransportError::NotConnected)?;
        Ok(SimLink {
            client,
            fragments: rx,
            reassembly: Reassembler::new(self.max_frame_size),
            mtu: self.mtu,
        })
    }
}

/// A simulated central's connection: writes fragmented documents and
/// reassembles notifications.
pub struct SimLink {
    client: Arc<GattClient>,
    fragments: Receiver<Vec<u8>>,
    reassembly: Reassembler,
    mtu: usize,
}

impl SimLink {
    /// Write one document to the Inbox characteristic.
    pub fn write(&self, document: &[u8]) -> Result<(), TransportError> {
        for frag in fragment(document, self.mtu)? {
            self.client.on_gatt_write(&frag)?;
        }
        Ok(())
    }

    /// Next complete notified document, or `None` after `timeout`.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        loop {
            let frag = self.fragments.recv_timeout(timeout).ok()?;
            match self.reassembly.push(&frag) {
                Ok(Some(document)) => return Some(document),
                Ok(None) => {}
                Err(e) => warn!("Conn: central dropped bad notification: {}", e),
            }
        }
    }

    /// Block until the daemon has taken the connection, or `timeout` passes.
    pub fn wait_attached(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while !self.client.is_attached() {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Read the Provision-state characteristic, as a polling companion does.
    pub fn provision_state(&self) -> u16 {
        match self.client.read_characteristic(CHAR_PROVISION_STATE).as_deref() {
            Some(&[lo, hi]) => u16::from_le_bytes([lo, hi]),
            _ => 0,
        }
    }

    pub fn disconnect(&self) {
        self.client.close();
    }
}

// ── Tests ────────────────────────────────────────────────────
