//! Append-only audit log, distinct from the operator-facing `log`/`env_logger`
//! console output. One file, one writer lock, truncated at startup.
//!
//! Format: `[YYYY-MM-DD HH:MM:SS] [LEVEL] message`. Safe to call after
//! shutdown has begun: once `shutdown()` is invoked, further calls are
//! silently dropped rather than racing a closed file handle.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
    Warning,
    Debug,
    Client,
    Room,
    File,
    Server,
    Join,
    Broadcast,
    Whisper,
    Leave,
    Sendfile,
}

impl Level {
    fn as_tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Error => "ERROR",
            Level::Warning => "WARNING",
            Level::Debug => "DEBUG",
            Level::Client => "CLIENT",
            Level::Room => "ROOM",
            Level::File => "FILE",
            Level::Server => "SERVER",
            Level::Join => "JOIN",
            Level::Broadcast => "BROADCAST",
            Level::Whisper => "WHISPER",
            Level::Leave => "LEAVE",
            Level::Sendfile => "SENDFILE",
        }
    }
}

pub struct AuditLog {
    file: Mutex<Option<File>>,
    shutdown: AtomicBool,
}

impl AuditLog {
    /// Opens (truncating) the log file at `path`.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(Some(file)),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn log(&self, level: Level, message: impl AsRef<str>) {
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }
        let mut guard = self.file.lock();
        let Some(file) = guard.as_mut() else {
            return;
        };
        let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
        let _ = writeln!(file, "[{ts}] [{}] {}", level.as_tag(), message.as_ref());
        let _ = file.flush();
    }

    /// Marks the log as shut down; subsequent `log` calls are no-ops.
    /// Mirrors the original's `cleanup_logging` trylock-and-skip guard.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        *self.file.lock() = None;
    }
}
