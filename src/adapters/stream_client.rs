//! Stream transport: length-prefixed JSON documents over a TCP socket.
//!
//! The socket is split with `try_clone`: the reader half is owned by
//! [`run`](ConnectedClient::run), the writer half sits behind a mutex so
//! that concurrent senders (dispatch thread, service workers) each write
//! one whole frame.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::TransportError;
use crate::rpc::codec::{FrameDecoder, HEADER_SIZE, encode_frame};
use crate::rpc::transport::{ConnectedClient, DataHandler};

/// How often a blocked read re-checks the close flag.
const READ_POLL: Duration = Duration::from_millis(100);

pub struct StreamClient {
    reader: Mutex<TcpStream>,
    writer: Mutex<TcpStream>,
    handler: Mutex<Option<DataHandler>>,
    closed: AtomicBool,
    peer: SocketAddr,
    max_frame_size: usize,
}

impl StreamClient {
    pub fn new(stream: TcpStream, max_frame_size: usize) -> Result<Self, TransportError> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(READ_POLL))?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: Mutex::new(stream),
            writer: Mutex::new(writer),
            handler: Mutex::new(None),
            closed: AtomicBool::new(false),
            peer,
            max_frame_size,
        })
    }

    fn deliver(&self, frame: &[u8]) {
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(h) => h(frame),
            None => debug!("Conn: no data handler, dropping {} byte frame", frame.len()),
        }
    }
}

impl ConnectedClient for StreamClient {
    fn set_data_handler(&self, handler: DataHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    fn enqueue_for_send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }
        let frame = encode_frame(data, self.max_frame_size).ok_or(TransportError::FrameTooLarge {
            len: data.len(),
            max: self.max_frame_size,
        })?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&frame)?;
        writer.flush()?;
        Ok(())
    }

    fn run(&self) -> Result<(), TransportError> {
        let mut stream = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let mut decoder = FrameDecoder::new(self.max_frame_size);
        let mut buf = vec![0u8; self.max_frame_size + HEADER_SIZE];

        while !self.closed.load(Ordering::Acquire) {
            match stream.read(&mut buf) {
                Ok(0) => {
                    info!("Conn: {} closed the connection", self.peer);
                    break;
                }
                Ok(n) => {
                    for frame in decoder.feed(&buf[..n]) {
                        self.deliver(&frame);
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
                Err(e) => {
                    if self.closed.load(Ordering::Acquire) {
                        break;
                    }
                    warn!("Conn: read from {} failed: {}", self.peer, e);
                    self.closed.store(true, Ordering::Release);
                    return Err(e.into());
                }
            }
        }

        self.closed.store(true, Ordering::Release);
        if decoder.discarded() > 0 {
            warn!("Conn: {} discarded {} bad frames", self.peer, decoder.discarded());
        }
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Conn: closing {}", self.peer);
        }
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writer.shutdown(Shutdown::Both);
    }

    fn peer(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}
