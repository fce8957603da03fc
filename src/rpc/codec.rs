//! Length-prefix frame codec for stream transports.
//!
//! Wire format:
//! ```text
//! ┌────────────┬──────────────────────────┐
//! │ Length (4B)│ JSON document (N B)      │
//! │ LE u32     │                          │
//! └────────────┴──────────────────────────┘
//! ```
//!
//! The decoder accumulates incoming bytes and yields complete frames.
//! A single socket read may return part of the header, part of the
//! payload, or several frames concatenated; all of them come out in order.

/// Frame header size (4-byte little-endian length).
pub const HEADER_SIZE: usize = 4;

/// Decoder state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Waiting for header bytes.
    ReadingHeader { collected: usize },
    /// Header received, reading payload.
    ReadingPayload { expected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    payload: Vec<u8>,
    max_frame_size: usize,
    discarded: u32,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header_buf: [0; HEADER_SIZE],
            payload: Vec::new(),
            max_frame_size,
            discarded: 0,
        }
    }

    /// Feed bytes into the decoder, returning every frame they complete.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            match self.state {
                DecoderState::ReadingHeader { collected } => {
                    let to_copy = (HEADER_SIZE - collected).min(data.len() - offset);
                    self.header_buf[collected..collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    offset += to_copy;

                    let collected = collected + to_copy;
                    if collected < HEADER_SIZE {
                        self.state = DecoderState::ReadingHeader { collected };
                        continue;
                    }

                    let expected = u32::from_le_bytes(self.header_buf) as usize;
                    if expected == 0 || expected > self.max_frame_size {
                        // Invalid frame: drop the header and resync on the next one.
                        log::warn!("RPC: discarding frame header (len={})", expected);
                        self.discarded = self.discarded.wrapping_add(1);
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                        continue;
                    }

                    self.payload.clear();
                    self.payload.reserve(expected);
                    self.state = DecoderState::ReadingPayload { expected };
                }

                DecoderState::ReadingPayload { expected } => {
                    let to_copy = (expected - self.payload.len()).min(data.len() - offset);
                    self.payload
                        .extend_from_slice(&data[offset..offset + to_copy]);
                    offset += to_copy;

                    if self.payload.len() == expected {
                        frames.push(core::mem::take(&mut self.payload));
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                    }
                }
            }
        }

        frames
    }

    /// Reset decoder state (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
        self.payload.clear();
    }

    /// Headers rejected for being empty or oversized.
    pub fn discarded(&self) -> u32 {
        self.discarded
    }

    /// Whether a frame is partially buffered.
    pub fn is_mid_frame(&self) -> bool {
        self.state != DecoderState::ReadingHeader { collected: 0 }
    }
}

/// Encode a document into a length-prefixed frame.
///
/// Returns `None` when the payload is empty or exceeds `max_frame_size`.
pub fn encode_frame(payload: &[u8], max_frame_size: usize) -> Option<Vec<u8>> {
    if payload.is_empty() || payload.len() > max_frame_size {
        return None;
    }
    let len = u32::try_from(payload.len()).ok()?;

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Some(out)
}
