//! Multi-user chat server engine: framed wire protocol, session state
//! machine, room and client registries, and a bounded file-transfer
//! queue, tied together by [`state::AppState`] and driven by
//! [`acceptor::serve`].

pub mod acceptor;
pub mod client_registry;
pub mod commands;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod room;
pub mod session;
pub mod state;
pub mod transfer_queue;
