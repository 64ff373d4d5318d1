//! Error types for the protocol codec and the session engine.
//!
//! Boundary code (CLI entry points, socket setup, log-file open) uses
//! `anyhow::Result`; the engine itself returns these typed errors because
//! callers need to distinguish a fatal framing violation from an
//! ordinary closed connection.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum ProtoError {
    Io(io::Error),
    FrameTooLarge { len: usize, max: usize },
    InvalidUtf8,
}

impl fmt::Display for ProtoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtoError::Io(e) => write!(f, "io error: {e}"),
            ProtoError::FrameTooLarge { len, max } => {
                write!(f, "frame length {len} exceeds limit {max}")
            }
            ProtoError::InvalidUtf8 => write!(f, "frame payload is not valid utf-8"),
        }
    }
}

impl std::error::Error for ProtoError {}

impl From<io::Error> for ProtoError {
    fn from(e: io::Error) -> Self {
        ProtoError::Io(e)
    }
}

pub type ProtoResult<T> = Result<T, ProtoError>;
