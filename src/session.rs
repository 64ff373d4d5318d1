//! Per-connection session: identity, wire handle, and room membership.
//!
//! Fields here are split along the locking discipline from `SPEC_FULL.md`
//! §5: the owning worker mutates `state`/`uploading`/`downloading`, only
//! the owning worker and the room it's in under the room lock mutate
//! `current_room`, and any worker may push frames via `writer` because
//! every write goes through `FramedWriter`'s own lock.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::protocol::FramedWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitLogin,
    Active,
    Closing,
}

pub struct Session {
    pub username: String,
    pub work_path: String,
    pub addr: SocketAddr,
    pub writer: FramedWriter,
    pub logged_in_at: Instant,
    pub current_room: Mutex<Option<String>>,
    state: Mutex<SessionState>,
    pub uploading: AtomicBool,
    pub downloading: AtomicBool,
}

impl Session {
    pub fn new(username: String, work_path: String, addr: SocketAddr, writer: FramedWriter) -> Self {
        Self {
            username,
            work_path,
            addr,
            writer,
            logged_in_at: Instant::now(),
            current_room: Mutex::new(None),
            state: Mutex::new(SessionState::Active),
            uploading: AtomicBool::new(false),
            downloading: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn set_state(&self, s: SessionState) {
        *self.state.lock() = s;
    }

    pub fn room_name(&self) -> Option<String> {
        self.current_room.lock().clone()
    }

    pub fn send(&self, msg: &str) {
        if let Err(e) = self.writer.send_frame(msg) {
            log::warn!("send to {} failed: {e}", self.username);
        }
    }
}
