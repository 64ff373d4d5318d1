//! Wire codec: length-prefixed framed control messages plus a raw bulk
//! byte-stream mode used only immediately after a file-transfer header.
//!
//! Framing: a 4-byte big-endian unsigned length `L`, followed by exactly
//! `L` bytes of payload. `L == 0` is a permitted empty frame and is
//! surfaced to the caller as an empty string, never as end-of-stream.
//! A `L` at or beyond `max_len` is a fatal framing error: the sender is
//! presumed to be speaking a different protocol version or corrupt.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use crate::error::{ProtoError, ProtoResult};

/// Frames larger than this are refused unless a caller asks for a bigger
/// ceiling explicitly (file payloads do, via [`read_bulk`]).
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024;

/// Hard ceiling on a single file transfer, per the allowed constants.
pub const MAX_FILE_BYTES: usize = 3 * 1024 * 1024;

fn read_exact_retry<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn write_all_retry<W: Write>(w: &mut W, buf: &[u8]) -> io::Result<()> {
    let mut sent = 0;
    while sent < buf.len() {
        match w.write(&buf[sent..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write returned zero bytes",
                ));
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Reads one length header. Returns `Ok(None)` only on a genuine closed
/// connection (zero bytes available at the very start of the header).
fn read_len_header<R: Read>(r: &mut R) -> io::Result<Option<u32>> {
    let mut header = [0u8; 4];
    match r.read(&mut header[..1]) {
        Ok(0) => return Ok(None),
        Ok(1) => {}
        Ok(_) => unreachable!(),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => return read_len_header(r),
        Err(e) => return Err(e),
    }
    read_exact_retry(r, &mut header[1..])?;
    Ok(Some(u32::from_be_bytes(header)))
}

/// Reads one framed UTF-8 message, enforcing `max_len` as a fatal ceiling.
/// A zero-length frame decodes to `Some(String::new())`, never `None`.
pub fn read_frame<R: Read>(r: &mut R, max_len: usize) -> ProtoResult<Option<String>> {
    let len = match read_len_header(r)? {
        Some(l) => l as usize,
        None => return Ok(None),
    };
    if len == 0 {
        return Ok(Some(String::new()));
    }
    if len >= max_len {
        return Err(ProtoError::FrameTooLarge { len, max: max_len });
    }
    let mut buf = vec![0u8; len];
    read_exact_retry(r, &mut buf)?;
    let s = String::from_utf8(buf).map_err(|_| ProtoError::InvalidUtf8)?;
    Ok(Some(s))
}

/// Writes one framed UTF-8 message.
pub fn write_frame<W: Write>(w: &mut W, msg: &str) -> ProtoResult<()> {
    let bytes = msg.as_bytes();
    let len = u32::try_from(bytes.len()).map_err(|_| ProtoError::FrameTooLarge {
        len: bytes.len(),
        max: u32::MAX as usize,
    })?;
    write_all_retry(w, &len.to_be_bytes())?;
    write_all_retry(w, bytes)?;
    Ok(())
}

/// Reads a raw bulk byte stream: 4-byte BE length then exactly that many
/// bytes. Used only right after a `FILE_UPLOAD_REQUEST`/`FILE_DOWNLOAD`
/// framed header. `max_len` should be [`MAX_FILE_BYTES`] for uploads.
pub fn read_bulk<R: Read>(r: &mut R, max_len: usize) -> ProtoResult<Vec<u8>> {
    let mut header = [0u8; 4];
    read_exact_retry(r, &mut header)?;
    let len = u32::from_be_bytes(header) as usize;
    if len > max_len {
        return Err(ProtoError::FrameTooLarge { len, max: max_len });
    }
    let mut buf = vec![0u8; len];
    read_exact_retry(r, &mut buf)?;
    Ok(buf)
}

/// Writes a raw bulk byte stream: 4-byte BE length then the bytes.
pub fn write_bulk<W: Write>(w: &mut W, payload: &[u8]) -> ProtoResult<()> {
    let len = u32::try_from(payload.len()).map_err(|_| ProtoError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    write_all_retry(w, &len.to_be_bytes())?;
    write_all_retry(w, payload)?;
    Ok(())
}

/// A cloned write half of a session's socket, wrapped so every outbound
/// write (control frame or bulk bytes) goes through one lock. This closes
/// the write-interleaving hazard noted for the file-transfer path: a
/// broadcast and a file payload can never interleave on the same socket.
pub struct FramedWriter {
    inner: parking_lot::Mutex<TcpStream>,
}

impl FramedWriter {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            inner: parking_lot::Mutex::new(stream),
        }
    }

    pub fn send_frame(&self, msg: &str) -> ProtoResult<()> {
        let mut guard = self.inner.lock();
        write_frame(&mut *guard, msg)
    }

    pub fn send_bulk(&self, payload: &[u8]) -> ProtoResult<()> {
        let mut guard = self.inner.lock();
        write_bulk(&mut *guard, payload)
    }

    pub fn try_clone(&self) -> io::Result<TcpStream> {
        self.inner.lock().try_clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, "LOGIN_SUCCESS").unwrap();
        let mut cursor = Cursor::new(buf);
        let out = read_frame(&mut cursor, DEFAULT_MAX_FRAME).unwrap();
        assert_eq!(out, Some("LOGIN_SUCCESS".to_string()));
    }

    #[test]
    fn zero_length_frame_is_empty_not_eof() {
        let mut buf = Vec::new();
        write_frame(&mut buf, "").unwrap();
        let mut cursor = Cursor::new(buf);
        let out = read_frame(&mut cursor, DEFAULT_MAX_FRAME).unwrap();
        assert_eq!(out, Some(String::new()));
    }

    #[test]
    fn closed_stream_is_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let out = read_frame(&mut cursor, DEFAULT_MAX_FRAME).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn oversize_frame_is_fatal() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(100u32).to_be_bytes());
        buf.extend_from_slice(&[0u8; 100]);
        let mut cursor = Cursor::new(buf);
        let err = read_frame(&mut cursor, 50).unwrap_err();
        assert!(matches!(err, ProtoError::FrameTooLarge { .. }));
    }

    #[test]
    fn bulk_round_trip() {
        let mut buf = Vec::new();
        let payload = vec![1u8, 2, 3, 4, 5];
        write_bulk(&mut buf, &payload).unwrap();
        let mut cursor = Cursor::new(buf);
        let out = read_bulk(&mut cursor, MAX_FILE_BYTES).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn bulk_over_limit_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(10u32).to_be_bytes());
        buf.extend_from_slice(&[0u8; 10]);
        let mut cursor = Cursor::new(buf);
        let err = read_bulk(&mut cursor, 5).unwrap_err();
        assert!(matches!(err, ProtoError::FrameTooLarge { .. }));
    }
}
