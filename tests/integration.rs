//! End-to-end exercise of login, join, broadcast, and shutdown over a
//! real loopback TCP socket, driving the server exactly as a client would.

use std::net::TcpListener;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use roomcast::logging::AuditLog;
use roomcast::protocol::{self, DEFAULT_MAX_FRAME};
use roomcast::state::AppState;

fn spawn_server() -> (std::net::SocketAddr, Arc<AppState>, Arc<AtomicBool>, thread::JoinHandle<()>) {
    let dir = tempfile::tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("server.log")).unwrap();
    let state = AppState::new(log);
    let state_handle = state.clone();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let handle = thread::spawn(move || {
        roomcast::acceptor::serve(listener, state, shutdown_clone).unwrap();
    });
    // give the acceptor a moment to enter its loop
    thread::sleep(Duration::from_millis(50));
    (addr, state_handle, shutdown, handle)
}

fn login(stream: &mut TcpStream, username: &str) {
    protocol::write_frame(stream, username).unwrap();
    protocol::write_frame(stream, "/tmp").unwrap();
    let reply = protocol::read_frame(stream, DEFAULT_MAX_FRAME).unwrap().unwrap();
    assert_eq!(reply, "LOGIN_SUCCESS");
}

fn send_cmd(stream: &mut TcpStream, cmd: &str) {
    protocol::write_frame(stream, cmd).unwrap();
}

fn recv(stream: &mut TcpStream) -> String {
    protocol::read_frame(stream, DEFAULT_MAX_FRAME).unwrap().unwrap()
}

#[test]
fn login_then_broadcast_without_room_is_rejected() {
    let (addr, _state, shutdown, handle) = spawn_server();
    let mut alice = TcpStream::connect(addr).unwrap();
    login(&mut alice, "alice");

    send_cmd(&mut alice, "/broadcast hi");
    assert_eq!(recv(&mut alice), "ERROR You must join a room first to broadcast messages");

    shutdown.store(true, Ordering::Release);
    handle.join().unwrap();
}

#[test]
fn join_and_broadcast_reaches_room_members() {
    let (addr, _state, shutdown, handle) = spawn_server();
    let mut alice = TcpStream::connect(addr).unwrap();
    let mut bob = TcpStream::connect(addr).unwrap();
    login(&mut alice, "alice");
    login(&mut bob, "bob");

    send_cmd(&mut alice, "/join room1");
    assert_eq!(recv(&mut alice), "JOIN_SUCCESS Joined room 'room1' (1/15 clients)");

    send_cmd(&mut bob, "/join room1");
    assert_eq!(recv(&mut alice), "ROOM_NOTIFICATION bob joined the room");
    assert_eq!(recv(&mut bob), "JOIN_SUCCESS Joined room 'room1' (2/15 clients)");

    send_cmd(&mut alice, "/broadcast hello");
    assert_eq!(recv(&mut bob), "BROADCAST [alice@room1]: hello");
    assert_eq!(recv(&mut alice), "BROADCAST_SUCCESS Message delivered to 1 recipient(s) in room 'room1'");

    shutdown.store(true, Ordering::Release);
    handle.join().unwrap();
}

#[test]
fn whisper_to_self_is_rejected() {
    let (addr, _state, shutdown, handle) = spawn_server();
    let mut alice = TcpStream::connect(addr).unwrap();
    login(&mut alice, "alice");

    send_cmd(&mut alice, "/whisper alice hi");
    assert_eq!(recv(&mut alice), "ERROR Cannot whisper to yourself");

    shutdown.store(true, Ordering::Release);
    handle.join().unwrap();
}

#[test]
fn sendfile_rejects_disallowed_extension() {
    let (addr, _state, shutdown, handle) = spawn_server();
    let mut alice = TcpStream::connect(addr).unwrap();
    let mut bob = TcpStream::connect(addr).unwrap();
    login(&mut alice, "alice");
    login(&mut bob, "bob");

    send_cmd(&mut alice, "/sendfile a.exe bob");
    assert_eq!(recv(&mut alice), "ERROR Invalid file type. Allowed: .txt, .pdf, .jpg, .png");

    shutdown.store(true, Ordering::Release);
    handle.join().unwrap();
}

#[test]
fn sendfile_delivers_bytes_to_receiver() {
    let (addr, _state, shutdown, handle) = spawn_server();
    let mut alice = TcpStream::connect(addr).unwrap();
    let mut bob = TcpStream::connect(addr).unwrap();
    login(&mut alice, "alice");
    login(&mut bob, "bob");

    send_cmd(&mut alice, "/sendfile pic.png bob");
    assert_eq!(recv(&mut alice), "FILE_UPLOAD_REQUEST:pic.png:bob");

    let payload: Vec<u8> = (1..=10u8).collect();
    protocol::write_bulk(&mut alice, &payload).unwrap();

    let header = recv(&mut bob);
    assert_eq!(header, "FILE_DOWNLOAD:pic.png:10:alice");
    let received = protocol::read_bulk(&mut bob, protocol::MAX_FILE_BYTES).unwrap();
    assert_eq!(received, payload);

    assert_eq!(
        recv(&mut alice),
        "FILE_TRANSFER_SUCCESS File 'pic.png' sent successfully to bob (10 bytes)"
    );

    shutdown.store(true, Ordering::Release);
    handle.join().unwrap();
}

#[test]
fn duplicate_username_is_rejected() {
    let (addr, _state, shutdown, handle) = spawn_server();
    let mut alice = TcpStream::connect(addr).unwrap();
    login(&mut alice, "alice");

    let mut alice2 = TcpStream::connect(addr).unwrap();
    protocol::write_frame(&mut alice2, "alice").unwrap();
    protocol::write_frame(&mut alice2, "/tmp").unwrap();
    let reply = protocol::read_frame(&mut alice2, DEFAULT_MAX_FRAME).unwrap().unwrap();
    assert_eq!(reply, "Username already taken");

    shutdown.store(true, Ordering::Release);
    handle.join().unwrap();
}

#[test]
fn sixteenth_member_is_rejected_from_a_full_room() {
    let (addr, _state, shutdown, handle) = spawn_server();

    let mut members = Vec::new();
    for i in 0..roomcast::room::MAX_MEMBERS_PER_ROOM {
        let username = format!("user{i}");
        let mut stream = TcpStream::connect(addr).unwrap();
        login(&mut stream, &username);
        send_cmd(&mut stream, "/join lounge");
        let expected = format!("JOIN_SUCCESS Joined room 'lounge' ({}/15 clients)", i + 1);
        assert_eq!(recv(&mut stream), expected);
        // drain the join notice delivered to every earlier member
        for earlier in &mut members {
            let _: &mut TcpStream = earlier;
            assert_eq!(recv(earlier), format!("ROOM_NOTIFICATION {username} joined the room"));
        }
        members.push(stream);
    }

    let mut latecomer = TcpStream::connect(addr).unwrap();
    login(&mut latecomer, "latecomer");
    send_cmd(&mut latecomer, "/join lounge");
    assert_eq!(recv(&mut latecomer), "ERROR Room 'lounge' is full (15/15 clients)");

    shutdown.store(true, Ordering::Release);
    handle.join().unwrap();
}

#[test]
fn sixth_concurrent_file_transfer_is_rejected() {
    let (addr, state, shutdown, handle) = spawn_server();

    // Pre-fill every transfer slot directly, bypassing sockets, so the
    // boundary is exercised deterministically rather than by racing real
    // in-flight deliveries.
    for i in 0..roomcast::transfer_queue::MAX_CONCURRENT_TRANSFERS {
        let ticket = roomcast::transfer_queue::Ticket {
            filename: format!("f{i}.txt"),
            sender: "someone".to_string(),
            receiver: "someone_else".to_string(),
            payload: vec![],
            created_at: std::time::Instant::now(),
        };
        state.transfers.try_admit(ticket).unwrap();
    }
    assert!(state.transfers.is_full());

    let mut alice = TcpStream::connect(addr).unwrap();
    let mut bob = TcpStream::connect(addr).unwrap();
    login(&mut alice, "alice");
    login(&mut bob, "bob");

    send_cmd(&mut alice, "/sendfile pic.png bob");
    assert_eq!(
        recv(&mut alice),
        "ERROR Upload queue is full (5/5). Please try again later."
    );

    shutdown.store(true, Ordering::Release);
    handle.join().unwrap();
}

#[test]
fn rejoining_the_same_room_is_a_no_op() {
    let (addr, _state, shutdown, handle) = spawn_server();
    let mut alice = TcpStream::connect(addr).unwrap();
    login(&mut alice, "alice");

    send_cmd(&mut alice, "/join room1");
    assert_eq!(recv(&mut alice), "JOIN_SUCCESS Joined room 'room1' (1/15 clients)");

    send_cmd(&mut alice, "/join room1");
    assert_eq!(recv(&mut alice), "INFO You are already in room 'room1'");

    shutdown.store(true, Ordering::Release);
    handle.join().unwrap();
}

#[test]
fn joining_a_new_room_leaves_only_the_previous_one() {
    let (addr, _state, shutdown, handle) = spawn_server();
    let mut alice = TcpStream::connect(addr).unwrap();
    let mut bob = TcpStream::connect(addr).unwrap();
    login(&mut alice, "alice");
    login(&mut bob, "bob");

    send_cmd(&mut alice, "/join roomA");
    assert_eq!(recv(&mut alice), "JOIN_SUCCESS Joined room 'roomA' (1/15 clients)");

    send_cmd(&mut bob, "/join roomA");
    assert_eq!(recv(&mut alice), "ROOM_NOTIFICATION bob joined the room");
    assert_eq!(recv(&mut bob), "JOIN_SUCCESS Joined room 'roomA' (2/15 clients)");

    send_cmd(&mut alice, "/join roomB");
    assert_eq!(recv(&mut bob), "ROOM_NOTIFICATION alice left the room");
    assert_eq!(recv(&mut alice), "JOIN_SUCCESS Joined room 'roomB' (1/15 clients)");

    // alice is no longer reachable from roomA's broadcast, only roomB's.
    send_cmd(&mut bob, "/broadcast still here");
    assert_eq!(
        recv(&mut bob),
        "BROADCAST_SUCCESS Message delivered to 0 recipient(s) in room 'roomA'"
    );

    shutdown.store(true, Ordering::Release);
    handle.join().unwrap();
}

#[test]
fn leaving_twice_in_a_row_only_succeeds_once() {
    let (addr, _state, shutdown, handle) = spawn_server();
    let mut alice = TcpStream::connect(addr).unwrap();
    login(&mut alice, "alice");

    send_cmd(&mut alice, "/join room1");
    assert_eq!(recv(&mut alice), "JOIN_SUCCESS Joined room 'room1' (1/15 clients)");

    send_cmd(&mut alice, "/leave");
    assert_eq!(recv(&mut alice), "LEAVE_SUCCESS Left room 'room1'");

    send_cmd(&mut alice, "/leave");
    assert_eq!(recv(&mut alice), "ERROR You are not in any room");

    shutdown.store(true, Ordering::Release);
    handle.join().unwrap();
}

#[test]
fn blank_command_is_rejected_explicitly() {
    let (addr, _state, shutdown, handle) = spawn_server();
    let mut alice = TcpStream::connect(addr).unwrap();
    login(&mut alice, "alice");

    send_cmd(&mut alice, "");
    assert_eq!(recv(&mut alice), "ERROR Empty command");

    send_cmd(&mut alice, "   ");
    assert_eq!(recv(&mut alice), "ERROR Empty command");

    shutdown.store(true, Ordering::Release);
    handle.join().unwrap();
}
