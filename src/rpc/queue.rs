//! Inbound queue: FIFO between the transport callback and the dispatch loop.
//!
//! ```text
//! ┌──────────────┐  push   ┌──────────────┐  pop   ┌───────────────┐
//! │  Transport   │────────▶│ InboundQueue │───────▶│ Dispatch loop │
//! │  (any thread)│         │ Mutex+Condvar│        │ (one consumer)│
//! └──────────────┘         └──────────────┘        └───────────────┘
//! ```
//!
//! Unbounded; producers never block. `stop` wins over pending entries: a
//! stopped queue hands out nothing and drops what it holds.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use super::message::Request;
use super::wire::DecodeError;

/// One decoded (or undecodable) inbound document.
pub type Inbound = Result<Request, DecodeError>;

struct QueueState {
    entries: VecDeque<Inbound>,
    stopped: bool,
}

pub struct InboundQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                stopped: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry and wake the consumer.
    /// Returns `false` (entry dropped) if the queue is stopped.
    pub fn push(&self, entry: Inbound) -> bool {
        let mut state = self.lock();
        if state.stopped {
            return false;
        }
        state.entries.push_back(entry);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Block until an entry is available or the queue is stopped.
    /// Returns `None` once stopped, even if entries were queued.
    pub fn pop(&self) -> Option<Inbound> {
        let mut state = self.lock();
        loop {
            if state.stopped {
                return None;
            }
            if let Some(entry) = state.entries.pop_front() {
                return Some(entry);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop the queue, wake the consumer and discard pending entries.
    /// Returns how many entries were discarded.
    pub fn stop(&self) -> usize {
        let mut state = self.lock();
        state.stopped = true;
        let discarded = state.entries.len();
        state.entries.clear();
        drop(state);
        self.available.notify_all();
        discarded
    }

    /// Re-arm for a new connection: clear the stop flag and any leftovers.
    pub fn restart(&self) {
        let mut state = self.lock();
        state.stopped = false;
        state.entries.clear();
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
