//! Bounded admission queue for in-flight file transfers. Mirrors
//! `file_transfer.c`'s fixed-size array, capacity 5, one lock. Admission
//! happens before the sender's bytes are read, and the ticket stays
//! admitted for the whole delivery (not just the read), so the queue is
//! genuine server-wide concurrency control on transfers in flight, not a
//! per-session buffer. Slots are fixed positions, not shifted on removal,
//! so a caller's index stays valid for the ticket's whole lifetime.

use std::time::Instant;

use parking_lot::Mutex;

pub const MAX_CONCURRENT_TRANSFERS: usize = 5;

#[derive(Clone)]
pub struct Ticket {
    pub filename: String,
    pub sender: String,
    pub receiver: String,
    pub payload: Vec<u8>,
    pub created_at: Instant,
}

pub struct TransferQueue {
    slots: Mutex<Vec<Option<Ticket>>>,
}

impl Default for TransferQueue {
    fn default() -> Self {
        Self {
            slots: Mutex::new((0..MAX_CONCURRENT_TRANSFERS).map(|_| None).collect()),
        }
    }
}

impl TransferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to admit `ticket` into the first free slot. Returns the
    /// slot index on success, or the ticket back if every slot is taken.
    pub fn try_admit(&self, ticket: Ticket) -> Result<usize, Ticket> {
        let mut slots = self.slots.lock();
        match slots.iter().position(|s| s.is_none()) {
            Some(idx) => {
                slots[idx] = Some(ticket);
                Ok(idx)
            }
            None => Err(ticket),
        }
    }

    /// Clones the ticket at `index` without freeing the slot, so its
    /// payload can be delivered while the slot still counts as occupied.
    pub fn peek(&self, index: usize) -> Option<Ticket> {
        self.slots.lock().get(index).and_then(|s| s.clone())
    }

    /// Frees the slot at `index`, once delivery has succeeded or failed.
    pub fn remove(&self, index: usize) -> Option<Ticket> {
        let mut slots = self.slots.lock();
        slots.get_mut(index).and_then(|s| s.take())
    }

    pub fn count(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.count() >= MAX_CONCURRENT_TRANSFERS
    }

    /// Drains every outstanding ticket, for shutdown. The caller is
    /// responsible for notifying each ticket's sender/receiver.
    pub fn drain_and_abort(&self) -> Vec<Ticket> {
        self.slots.lock().iter_mut().filter_map(|s| s.take()).collect()
    }
}
