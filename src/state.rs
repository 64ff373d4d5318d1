//! Ties the three registries and the audit log into one shared handle
//! that every session worker clones an `Arc` of. No cross-registry lock
//! is ever held across a call into another registry.

use std::sync::Arc;

use crate::client_registry::ClientRegistry;
use crate::logging::AuditLog;
use crate::room::RoomRegistry;
use crate::transfer_queue::TransferQueue;

pub struct AppState {
    pub clients: ClientRegistry,
    pub rooms: RoomRegistry,
    pub transfers: TransferQueue,
    pub log: AuditLog,
}

impl AppState {
    pub fn new(log: AuditLog) -> Arc<Self> {
        Arc::new(Self {
            clients: ClientRegistry::new(),
            rooms: RoomRegistry::new(),
            transfers: TransferQueue::new(),
            log,
        })
    }
}
