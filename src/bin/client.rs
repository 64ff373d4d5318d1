//! `roomcast-client` — CLI entry point. Performs the login handshake,
//! then runs a background reader thread for asynchronous server pushes
//! (whispers, broadcasts, room notices, file transfers, shutdown) while
//! the main thread drives a blocking stdin command loop.

use std::fs;
use std::io::{self, BufRead, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use roomcast::protocol::{self, FramedWriter, DEFAULT_MAX_FRAME, MAX_FILE_BYTES};

/// Chat client: connects, logs in, and exchanges framed commands with roomcast-server.
#[derive(Parser, Debug)]
#[command(name = "roomcast-client")]
struct ClientArgs {
    /// Address of the server to connect to.
    server_ip: String,

    /// TCP port the server is listening on (1-65535).
    port: u16,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init()
        .ok();

    let args = ClientArgs::parse();
    if args.port == 0 {
        anyhow::bail!("port must be between 1 and 65535");
    }

    println!("Server IP: {}", args.server_ip);
    println!("Server Port: {}", args.port);

    let stream = TcpStream::connect((args.server_ip.as_str(), args.port))
        .with_context(|| format!("failed to connect to {}:{}", args.server_ip, args.port))?;

    let mut login_reader = stream.try_clone().context("failed to clone socket")?;
    let writer = Arc::new(FramedWriter::new(stream));

    login(&mut login_reader, &writer)?;

    let running = Arc::new(AtomicBool::new(true));
    let reader_writer = writer.clone();
    let reader_running = running.clone();
    let reader_handle = std::thread::spawn(move || {
        if let Err(e) = reader_loop(login_reader, reader_writer, reader_running.clone()) {
            log::warn!("reader thread ended: {e}");
        }
        reader_running.store(false, Ordering::Release);
    });

    process_user_input(&writer, &running)?;
    let _ = reader_handle.join();
    Ok(())
}

fn login(reader: &mut TcpStream, writer: &FramedWriter) -> Result<()> {
    let username = prompt("Enter username: ")?;
    let work_path = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    writer.send_frame(&username).context("failed to send username")?;
    writer.send_frame(&work_path).context("failed to send working path")?;

    loop {
        match protocol::read_frame(reader, DEFAULT_MAX_FRAME)? {
            Some(reply) if reply == "LOGIN_SUCCESS" => {
                println!("Login successful. Welcome, {username}!");
                return Ok(());
            }
            Some(reply) => {
                println!("{reply}");
                anyhow::bail!("login rejected: {reply}");
            }
            None => anyhow::bail!("server closed the connection during login"),
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush().ok();
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn process_user_input(writer: &FramedWriter, running: &AtomicBool) -> Result<()> {
    let stdin = io::stdin();
    print!("Enter a command: ");
    io::stdout().flush().ok();
    for line in stdin.lock().lines() {
        if !running.load(Ordering::Acquire) {
            break;
        }
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            print!("Enter a command: ");
            io::stdout().flush().ok();
            continue;
        }
        if writer.send_frame(trimmed).is_err() {
            break;
        }
        if trimmed == "/exit" {
            break;
        }
        print!("Enter a command: ");
        io::stdout().flush().ok();
    }
    Ok(())
}

fn reader_loop(mut reader: TcpStream, writer: Arc<FramedWriter>, running: Arc<AtomicBool>) -> Result<()> {
    reader.set_read_timeout(Some(Duration::from_secs(1))).ok();
    while running.load(Ordering::Acquire) {
        let msg = match protocol::read_frame(&mut reader, DEFAULT_MAX_FRAME) {
            Ok(Some(m)) => m,
            Ok(None) => {
                println!("Server closed the connection");
                break;
            }
            Err(roomcast::error::ProtoError::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(e) => {
                log::warn!("read failed: {e}");
                break;
            }
        };

        if let Some(rest) = msg.strip_prefix("FILE_UPLOAD_REQUEST:") {
            handle_upload_request(rest, &writer);
        } else if let Some(rest) = msg.strip_prefix("FILE_DOWNLOAD:") {
            handle_download(rest, &mut reader);
        } else if msg.starts_with("FILE_TRANSFER_ABORT") {
            println!("\n{msg}\nFile transfer cancelled due to server shutdown");
        } else if msg.starts_with("SERVER_SHUTDOWN") {
            println!("\n{msg}\nDisconnecting from server...");
            running.store(false, Ordering::Release);
            break;
        } else {
            println!("\nReceived: {msg}");
        }
        print!("Enter a command: ");
        io::stdout().flush().ok();
    }
    Ok(())
}

fn handle_upload_request(rest: &str, writer: &FramedWriter) {
    let Some((filename, _target)) = rest.split_once(':') else {
        return;
    };
    match fs::read(filename) {
        Ok(bytes) if bytes.len() <= MAX_FILE_BYTES => {
            if writer.send_bulk(&bytes).is_ok() {
                println!("\nFile upload completed successfully");
            } else {
                println!("\nFailed to upload file: {filename}");
            }
        }
        Ok(_) => println!("\nFailed to upload file: {filename} (exceeds maximum size)"),
        Err(e) => {
            println!("\nFailed to upload file: {filename} ({e})");
            let _ = writer.send_bulk(&[]);
        }
    }
}

fn handle_download(rest: &str, reader: &mut TcpStream) {
    let mut parts = rest.splitn(3, ':');
    let (Some(filename), Some(_size), Some(sender)) = (parts.next(), parts.next(), parts.next()) else {
        return;
    };
    match protocol::read_bulk(reader, MAX_FILE_BYTES) {
        Ok(bytes) => {
            let out_name = format!("received_{filename}");
            match fs::write(&out_name, &bytes) {
                Ok(()) => println!("\nReceived '{filename}' from {sender} ({} bytes) -> {out_name}", bytes.len()),
                Err(e) => println!("\nFailed to save received file: {e}"),
            }
        }
        Err(e) => println!("\nFailed to receive file: {e}"),
    }
}
