//! Command dispatch and handlers: `/join`, `/leave`, `/broadcast`,
//! `/whisper`, `/sendfile`, `/exit`. Reply and notification strings are
//! preserved byte-for-byte against the original implementation, including
//! the `/sendfile` extension-error text that lists only four of the five
//! allowed extensions.

use std::net::TcpStream;
use std::sync::Arc;

use crate::protocol::{self, MAX_FILE_BYTES};
use crate::room::{is_valid_room_name, JoinOutcome, MAX_MEMBERS_PER_ROOM};
use crate::session::Session;
use crate::state::AppState;
use crate::transfer_queue::{Ticket, MAX_CONCURRENT_TRANSFERS};
use crate::logging::Level;

const ALLOWED_EXTENSIONS: [&str; 5] = [".txt", ".pdf", ".jpg", ".png", ".mp4"];

pub enum Outcome {
    Continue,
    Close,
}

/// Dispatches one already-trimmed command line. `reader` is the
/// session's own read half, needed only by `/sendfile` to pull the raw
/// upload bytes immediately after requesting them.
pub fn dispatch(
    state: &AppState,
    session: &Arc<Session>,
    reader: &mut TcpStream,
    line: &str,
) -> Outcome {
    if line.is_empty() {
        session.send("ERROR Empty command");
        return Outcome::Continue;
    }

    if line == "/exit" {
        state.log.log(Level::Client, format!("{} sent /exit", session.username));
        return Outcome::Close;
    }

    if let Some(rest) = line.strip_prefix("/join ") {
        handle_join(state, session, rest.trim());
    } else if line == "/leave" {
        handle_leave(state, session);
    } else if let Some(rest) = line.strip_prefix("/broadcast ") {
        handle_broadcast(state, session, rest);
    } else if let Some(rest) = line.strip_prefix("/whisper ") {
        handle_whisper(state, session, rest);
    } else if let Some(rest) = line.strip_prefix("/sendfile ") {
        handle_sendfile(state, session, reader, rest);
    } else {
        session.send(&format!("ERROR Unknown command: {line}"));
    }
    Outcome::Continue
}

fn leave_current_room(state: &AppState, session: &Arc<Session>) -> Option<String> {
    let room_name = session.current_room.lock().take()?;
    let Some(room) = state.rooms.find(&room_name) else {
        return Some(room_name);
    };
    if let Some((remaining, empty)) = room.leave(&session.username) {
        let notice = format!("ROOM_NOTIFICATION {} left the room", session.username);
        for member in &remaining {
            member.send(&notice);
        }
        if empty {
            state.rooms.remove_if_empty(&room_name);
        }
    }
    Some(room_name)
}

fn handle_join(state: &AppState, session: &Arc<Session>, room_name: &str) {
    if !is_valid_room_name(room_name) {
        session.send(&format!("ERROR Invalid room name '{room_name}'"));
        return;
    }

    if session.room_name().as_deref() == Some(room_name) {
        session.send(&format!("INFO You are already in room '{room_name}'"));
        return;
    }

    leave_current_room(state, session);

    let room = state.rooms.get_or_create(room_name);
    match room.join(session.clone()) {
        JoinOutcome::Full { capacity, member_count } => {
            session.send(&format!(
                "ERROR Room '{room_name}' is full ({member_count}/{capacity} clients)"
            ));
        }
        JoinOutcome::Joined { member_count, others } => {
            *session.current_room.lock() = Some(room_name.to_string());
            session.send(&format!(
                "JOIN_SUCCESS Joined room '{room_name}' ({member_count}/{MAX_MEMBERS_PER_ROOM} clients)"
            ));
            let notice = format!("ROOM_NOTIFICATION {} joined the room", session.username);
            for other in others {
                other.send(&notice);
            }
            state.log.log(
                Level::Join,
                format!("{} joined room '{room_name}'", session.username),
            );
        }
    }
}

fn handle_leave(state: &AppState, session: &Arc<Session>) {
    match leave_current_room(state, session) {
        Some(room_name) => {
            session.send(&format!("LEAVE_SUCCESS Left room '{room_name}'"));
            state.log.log(
                Level::Leave,
                format!("{} left room '{room_name}'", session.username),
            );
        }
        None => session.send("ERROR You are not in any room"),
    }
}

fn handle_broadcast(state: &AppState, session: &Arc<Session>, message: &str) {
    let message = message.trim();
    let Some(room_name) = session.room_name() else {
        session.send("ERROR You must join a room first to broadcast messages");
        return;
    };
    if message.is_empty() {
        session.send("ERROR Broadcast message cannot be empty");
        return;
    }
    let Some(room) = state.rooms.find(&room_name) else {
        session.send("ERROR You must join a room first to broadcast messages");
        return;
    };

    let (targets, total_members) = room.broadcast_targets(&session.username);
    let expected = total_members.saturating_sub(1);
    let text = format!("BROADCAST [{}@{room_name}]: {message}", session.username);
    let mut delivered = 0usize;
    for target in &targets {
        if target.writer.send_frame(&text).is_ok() {
            delivered += 1;
        }
    }

    if delivered == expected {
        session.send(&format!(
            "BROADCAST_SUCCESS Message delivered to {delivered} recipient(s) in room '{room_name}'"
        ));
    } else {
        session.send(&format!(
            "BROADCAST_PARTIAL Message delivered to {delivered}/{expected} recipient(s) in room '{room_name}'"
        ));
    }
    state.log.log(
        Level::Broadcast,
        format!("{} broadcast in '{room_name}' to {delivered}/{expected}", session.username),
    );
}

fn handle_whisper(state: &AppState, session: &Arc<Session>, rest: &str) {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let target_name = parts.next().unwrap_or("").trim();
    let message = parts.next().unwrap_or("").trim();

    if target_name.is_empty() || message.is_empty() {
        session.send("ERROR Usage: /whisper <username> <message>");
        return;
    }
    if target_name == session.username {
        session.send("ERROR Cannot whisper to yourself");
        return;
    }
    let Some(target) = state.clients.find_by_username(target_name) else {
        session.send(&format!("ERROR User '{target_name}' not found or offline"));
        return;
    };

    let text = format!("WHISPER [{} \u{2192} {target_name}]: {message}", session.username);
    target.send(&text);
    session.send(&format!("WHISPER_SENT Whisper sent to {target_name}"));
    state.log.log(
        Level::Whisper,
        format!("{} whispered to {target_name}", session.username),
    );
}

fn has_allowed_extension(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn handle_sendfile(state: &AppState, session: &Arc<Session>, reader: &mut TcpStream, rest: &str) {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let filename = parts.next().unwrap_or("").trim();
    let target_name = parts.next().unwrap_or("").trim();

    if filename.is_empty() || target_name.is_empty() {
        session.send("ERROR Usage: /sendfile <filename> <username>");
        return;
    }
    if !has_allowed_extension(filename) {
        session.send("ERROR Invalid file type. Allowed: .txt, .pdf, .jpg, .png");
        return;
    }
    if target_name == session.username {
        session.send("ERROR Cannot send a file to yourself");
        return;
    }
    let Some(target) = state.clients.find_by_username(target_name) else {
        session.send(&format!("ERROR User '{target_name}' not found or offline"));
        return;
    };

    if state.transfers.is_full() {
        session.send(&format!(
            "ERROR Upload queue is full ({MAX_CONCURRENT_TRANSFERS}/{MAX_CONCURRENT_TRANSFERS}). Please try again later."
        ));
        return;
    }

    if session
        .writer
        .send_frame(&format!("FILE_UPLOAD_REQUEST:{filename}:{target_name}"))
        .is_err()
    {
        return;
    }

    session.uploading.store(true, std::sync::atomic::Ordering::Release);
    let payload = protocol::read_bulk(reader, MAX_FILE_BYTES);
    session.uploading.store(false, std::sync::atomic::Ordering::Release);
    let payload = match payload {
        Ok(bytes) => bytes,
        Err(e) => {
            state.log.log(Level::Error, format!("sendfile read failed: {e}"));
            session.send(&format!("FILE_TRANSFER_FAILED Failed to send '{filename}' to {target_name}"));
            return;
        }
    };
    let byte_len = payload.len();

    let ticket = Ticket {
        filename: filename.to_string(),
        sender: session.username.clone(),
        receiver: target_name.to_string(),
        payload,
        created_at: std::time::Instant::now(),
    };

    let index = match state.transfers.try_admit(ticket) {
        Ok(idx) => idx,
        Err(_) => {
            session.send(&format!(
                "ERROR Upload queue is full ({MAX_CONCURRENT_TRANSFERS}/{MAX_CONCURRENT_TRANSFERS}). Please try again later."
            ));
            return;
        }
    };

    // The ticket stays admitted for the whole blocking delivery, not just
    // the instant between admission and this point, so the queue's
    // occupancy genuinely reflects transfers in flight.
    let delivered = match state.transfers.peek(index) {
        Some(t) => deliver_ticket(&target, &t),
        None => false,
    };
    state.transfers.remove(index);

    if delivered {
        session.send(&format!(
            "FILE_TRANSFER_SUCCESS File '{filename}' sent successfully to {target_name} ({byte_len} bytes)"
        ));
        state.log.log(
            Level::Sendfile,
            format!("{} sent '{filename}' to {target_name} ({byte_len} bytes)", session.username),
        );
    } else {
        session.send(&format!("FILE_TRANSFER_FAILED Failed to send '{filename}' to {target_name}"));
    }
}

fn deliver_ticket(target: &Session, ticket: &Ticket) -> bool {
    let header = format!(
        "FILE_DOWNLOAD:{}:{}:{}",
        ticket.filename,
        ticket.payload.len(),
        ticket.sender
    );
    if target.writer.send_frame(&header).is_err() {
        return false;
    }
    target.downloading.store(true, std::sync::atomic::Ordering::Release);
    let ok = target.writer.send_bulk(&ticket.payload).is_ok();
    target.downloading.store(false, std::sync::atomic::Ordering::Release);
    ok
}
