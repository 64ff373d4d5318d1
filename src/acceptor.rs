//! Listening socket, connection spawner, and the SIGINT-driven graceful
//! shutdown sequence: notify sessions, abort pending transfers, wait up
//! to 3s for workers to drain, empty the transfer queue, close the
//! listener.

use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::client_registry::is_valid_username;
use crate::commands::{self, Outcome};
use crate::logging::Level;
use crate::protocol::{self, FramedWriter, DEFAULT_MAX_FRAME};
use crate::session::{Session, SessionState};
use crate::state::AppState;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

pub fn serve(listener: TcpListener, state: Arc<AppState>, shutdown: Arc<AtomicBool>) -> std::io::Result<()> {
    listener.set_nonblocking(true)?;
    let active_workers = Arc::new(AtomicUsize::new(0));

    state.log.log(Level::Server, "server ready - listening for client connections");
    log::info!("server listening");

    while !shutdown.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, addr)) => {
                state.log.log(Level::Client, format!("new connection from {addr}"));
                let state = state.clone();
                let shutdown = shutdown.clone();
                let active_workers = active_workers.clone();
                active_workers.fetch_add(1, Ordering::AcqRel);
                thread::spawn(move || {
                    handle_connection(stream, addr, state.clone(), shutdown);
                    active_workers.fetch_sub(1, Ordering::AcqRel);
                });
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                state.log.log(Level::Error, format!("accept failed: {e}"));
            }
        }
    }

    shutdown_sequence(&state, &active_workers);
    Ok(())
}

fn shutdown_sequence(state: &Arc<AppState>, active_workers: &AtomicUsize) {
    state.log.log(Level::Server, "server shutdown initiated");

    for session in state.clients.snapshot() {
        session.send("SERVER_SHUTDOWN Server is shutting down. Please disconnect.");
    }

    for ticket in state.transfers.drain_and_abort() {
        let msg = format!(
            "FILE_TRANSFER_ABORT Server shutting down - transfer of '{}' aborted",
            ticket.filename
        );
        if let Some(sender) = state.clients.find_by_username(&ticket.sender) {
            sender.send(&msg);
        }
        if let Some(receiver) = state.clients.find_by_username(&ticket.receiver) {
            receiver.send(&msg);
        }
    }

    let deadline = Instant::now() + SHUTDOWN_GRACE;
    while active_workers.load(Ordering::Acquire) > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(100));
    }

    state.log.log(Level::Server, "file transfer queue cleaned up");
    state.log.log(Level::Server, "server shutdown complete");
    state.log.shutdown();
}

fn handle_connection(stream: TcpStream, addr: std::net::SocketAddr, state: Arc<AppState>, shutdown: Arc<AtomicBool>) {
    let _ = stream.set_read_timeout(Some(POLL_TIMEOUT));
    let mut reader = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };
    let writer = match stream.try_clone() {
        Ok(s) => FramedWriter::new(s),
        Err(_) => return,
    };

    let session = match login(&state, &mut reader, writer, addr, &shutdown) {
        Some(s) => s,
        None => return,
    };

    session_loop(&state, &session, &mut reader, &shutdown);
    teardown(&state, &session);
}

/// AwaitLogin: read username + working-path frames, validate, register.
/// Retries on recoverable validation failure; gives up on I/O error.
fn login(
    state: &Arc<AppState>,
    reader: &mut TcpStream,
    writer: FramedWriter,
    addr: std::net::SocketAddr,
    shutdown: &Arc<AtomicBool>,
) -> Option<Arc<Session>> {
    // Held across retries: only consumed once a login actually succeeds,
    // so a validation/duplicate rejection can still reply on this socket.
    let mut writer = Some(writer);

    loop {
        if shutdown.load(Ordering::Acquire) {
            return None;
        }
        let username = match protocol::read_frame(reader, DEFAULT_MAX_FRAME) {
            Ok(Some(u)) if !u.is_empty() => u,
            Ok(_) => continue,
            Err(e) if matches!(&e, crate::error::ProtoError::Io(io) if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)) => {
                continue;
            }
            Err(_) => return None,
        };
        let work_path = match protocol::read_frame(reader, DEFAULT_MAX_FRAME) {
            Ok(Some(p)) => p,
            Ok(None) | Err(_) => return None,
        };

        if !is_valid_username(&username) {
            let _ = writer.as_ref().unwrap().send_frame("Invalid username format");
            continue;
        }

        let result = state.clients.try_insert_with(&username, || {
            let writer = writer.take().expect("build is called at most once");
            Arc::new(Session::new(username.clone(), work_path.clone(), addr, writer))
        });
        let session = match result {
            Ok(session) => session,
            Err(()) => {
                let _ = writer.as_ref().unwrap().send_frame("Username already taken");
                continue;
            }
        };
        if session.writer.send_frame("LOGIN_SUCCESS").is_err() {
            state.clients.remove_session(&session);
            return None;
        }
        state.log.log(Level::Client, format!("{username} logged in from {addr}"));
        return Some(session);
    }
}

fn session_loop(state: &Arc<AppState>, session: &Arc<Session>, reader: &mut TcpStream, shutdown: &Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Acquire) || session.state() == SessionState::Closing {
            return;
        }
        match protocol::read_frame(reader, DEFAULT_MAX_FRAME) {
            Ok(Some(line)) => {
                let line = line.trim();
                match commands::dispatch(state, session, reader, line) {
                    Outcome::Continue => {}
                    Outcome::Close => return,
                }
            }
            Ok(None) => return,
            Err(e) => {
                if matches!(e, crate::error::ProtoError::Io(ref io) if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)) {
                    continue;
                }
                return;
            }
        }
    }
}

fn teardown(state: &Arc<AppState>, session: &Arc<Session>) {
    session.set_state(SessionState::Closing);
    if let Some(room_name) = session.current_room.lock().take() {
        if let Some(room) = state.rooms.find(&room_name) {
            if let Some((remaining, empty)) = room.leave(&session.username) {
                let notice = format!("ROOM_NOTIFICATION {} disconnected", session.username);
                for member in &remaining {
                    member.send(&notice);
                }
                if empty {
                    state.rooms.remove_if_empty(&room_name);
                }
            }
        }
    }
    state.clients.remove_session(session);
    state.log.log(Level::Client, format!("{} disconnected", session.username));
}
